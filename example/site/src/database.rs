use rorm::Database;
use rorm::DatabaseConfiguration;
use rorm::DatabaseDriver;
use serde::Deserialize;

/// Connection parameters read from `VITRINE_POSTGRES_*`
#[derive(Debug, Deserialize)]
pub struct PostgresConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

impl PostgresConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("VITRINE_POSTGRES_").from_env()
    }

    pub async fn connect(self) -> Result<Database, rorm::Error> {
        Database::connect(DatabaseConfiguration::new(DatabaseDriver::Postgres {
            name: self.name,
            host: self.host,
            port: self.port,
            user: self.user,
            password: self.password,
        }))
        .await
    }
}
