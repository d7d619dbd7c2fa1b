mod sea_orm_tag_repository;
mod sea_orm_tree_repository;

pub use sea_orm_tag_repository::SeaOrmTagRepository;
