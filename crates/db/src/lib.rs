pub mod connection;
pub mod live;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use live::{ChangeNotifier, LiveQuery};
pub use repositories::{
    clear_memory, ClearMemoryReport, InMemoryMissPatternRepository, InMemorySessionRepository,
    InMemoryShotRepository, MissPatternRepository, RepositoryError, SessionRepository,
    ShotRepository, SqlMissPatternRepository, SqlSessionRepository, SqlShotRepository,
};
