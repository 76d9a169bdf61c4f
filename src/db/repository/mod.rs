pub mod group_config_repository;
pub mod notification_task_repository;
pub mod opportunity_cache_repository;
pub mod run_repository;
pub mod system_config_repository;

pub use group_config_repository::GroupConfigRepository;
pub use notification_task_repository::NotificationTaskRepository;
pub use opportunity_cache_repository::OpportunityCacheRepository;
pub use run_repository::RunRepository;
pub use system_config_repository::SystemConfigRepository;
