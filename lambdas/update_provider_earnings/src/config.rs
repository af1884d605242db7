use figment::providers::Env;
use figment::Figment;
use serde::{Deserialize, Serialize};
use shared::core::WriteMode;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Config {
    pub earnings_table_name: String,
    pub providers_table_name: String,
    #[serde(default)]
    pub earnings_write_mode: WriteMode,
}

impl Config {
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Env::raw().only(&[
                "EARNINGS_TABLE_NAME",
                "PROVIDERS_TABLE_NAME",
                "EARNINGS_WRITE_MODE",
            ]))
            .extract()
    }
}
