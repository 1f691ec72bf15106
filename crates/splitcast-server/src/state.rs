use crate::sfu::SessionManager;
use crate::transport::TransportEngine;
use serde::Deserialize;
use splitcast_protocol::IceServer;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_address: String,
    pub stun_servers: Vec<String>,
    #[serde(default)]
    pub turn_servers: Vec<TurnServer>,
    /// Public address advertised as host candidate (NAT 1:1 mapping)
    #[serde(default)]
    pub public_host: Option<String>,
    /// Client page served for every path not handled by the router
    pub index_file: PathBuf,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TurnServer {
    pub url: String,
    pub username: String,
    pub credential: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: vec![],
            public_host: None,
            index_file: PathBuf::from("index.html"),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load from `splitcast.toml` (optional), `SPLITCAST_*` variables and `PORT`
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();
        let port_binding = std::env::var("PORT")
            .ok()
            .map(|port| format!("0.0.0.0:{}", port));

        let settings = config::Config::builder()
            .set_default("bind_address", defaults.bind_address)?
            .set_default("stun_servers", defaults.stun_servers)?
            .set_default("index_file", defaults.index_file.to_string_lossy().to_string())?
            .set_default("log_format", "pretty")?
            .add_source(config::File::with_name("splitcast").required(false))
            .add_source(
                config::Environment::with_prefix("SPLITCAST")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("stun_servers"),
            )
            .set_override_option("bind_address", port_binding)?
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// ICE servers in the order STUN first, then TURN
    pub fn ice_servers(&self) -> Vec<IceServer> {
        let mut ice_servers = vec![];

        for stun_url in &self.stun_servers {
            ice_servers.push(IceServer {
                urls: vec![stun_url.clone()],
                username: None,
                credential: None,
            });
        }

        for turn in &self.turn_servers {
            ice_servers.push(IceServer {
                urls: vec![turn.url.clone()],
                username: Some(turn.username.clone()),
                credential: Some(turn.credential.clone()),
            });
        }

        ice_servers
    }
}

pub struct AppState<E: TransportEngine> {
    pub config: Arc<Config>,
    pub sfu: Arc<SessionManager<E>>,
}

impl<E: TransportEngine> AppState<E> {
    pub fn new(config: Config, engine: E) -> Self {
        Self {
            config: Arc::new(config),
            sfu: SessionManager::new(engine),
        }
    }
}

impl<E: TransportEngine> Clone for AppState<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            sfu: self.sfu.clone(),
        }
    }
}
