use std::sync::Arc;

use anyhow::{Context as _, Result};
use application::{MergeEngine, TagRegistry, load_initial_tags};
use clap::Subcommand;
use domain::TagSet;
use domain::tag::TagTreeRepository;
use infrastructure::{SeaOrmTagRepository, TagFieldConfig, install_schema};
use sea_orm::{Database, DatabaseConnection};
use tracing::info;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the initial tags of every configured field
    InitialTags {
        /// Limit to `app`, `app.model` or `app.model.field`
        scope: Option<String>,
    },
    /// Create the tag tables, join tables and single-tag columns
    Migrate,
    /// Recompute paths, levels and parents of a tree tag field
    RebuildTree {
        /// Field as `app.model.field`
        field: String,
    },
    /// Merge tags into a target tag
    Merge {
        /// Field as `app.model.field`
        field: String,
        target: String,
        /// Tag string of the tags to merge away
        sources: String,
        /// Merge or move the children of tree sources too
        #[arg(long)]
        children: bool,
    },
}

/// Everything a command needs: the configured fields and a connection
pub struct Context {
    pub registry: Arc<TagRegistry>,
    pub db: DatabaseConnection,
}

impl Context {
    pub async fn connect(config: &TagFieldConfig) -> Result<Self> {
        let registry = TagRegistry::from_config(&config.models)?;
        info!(models = registry.models().len(), "Loaded tag fields");
        let db = Database::connect(&config.database_url)
            .await
            .with_context(|| "failed to connect to the database")?;
        Ok(Self {
            registry: Arc::new(registry),
            db,
        })
    }

    pub fn new(registry: Arc<TagRegistry>, db: DatabaseConnection) -> Self {
        Self { registry, db }
    }

    /// Run one command and return the line to print
    pub async fn run(&self, command: &Command) -> Result<String> {
        match command {
            Command::InitialTags { scope } => {
                let report = load_initial_tags(&self.registry, &self.db, scope.as_deref()).await?;
                let mut summary = format!(
                    "Loaded {} initial tags into {} tables",
                    report.tags, report.tables
                );
                if !report.failed.is_empty() {
                    summary.push_str(&format!("; failed: {}", report.failed.join(", ")));
                }
                Ok(summary)
            }
            Command::Migrate => {
                let schema = self.registry.schema();
                install_schema(&self.db, &schema).await?;
                Ok(format!("Installed {} tag tables", self.registry.tables().count()))
            }
            Command::RebuildTree { field } => {
                let binding = self.registry.require_field(field)?;
                let table = self.registry.table_for(binding)?;
                let store = SeaOrmTagRepository::new(&self.db, table);
                let rebuilt = store.rebuild().await?;
                Ok(format!("Rebuilt {} tags in {}", rebuilt, table.name))
            }
            Command::Merge {
                field,
                target,
                sources,
                children,
            } => {
                let binding = self.registry.require_field(field)?;
                let table = self.registry.table_for(binding)?;
                let sources = TagSet::parse(sources, &table.options)?;
                let report = MergeEngine::new(&self.registry, &self.db)
                    .merge_tree(&table.name, target, sources.names(), *children)
                    .await?;
                Ok(format!(
                    "Merged {} tags into {} ({} references moved, {} children re-parented)",
                    report.merged, target, report.references, report.moved
                ))
            }
        }
    }
}
