use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bind address (wildcard by default)
    pub bind_addr: String,

    /// Port to listen on; 0 lets the kernel pick one
    pub port: u16,

    /// Listen backlog
    pub backlog: i32,

    /// Capacity of the event batch filled by each wait call
    pub max_events: usize,

    /// Upper bound on simultaneously open client connections
    pub max_connections: usize,

    /// Largest result set a single response may carry
    pub max_response_ids: usize,

    /// How long one wait call may block before the shutdown flag is rechecked
    pub poll_timeout_ms: u64,

    /// TCP nodelay
    pub tcp_nodelay: bool,

    /// Path to the TOML city catalogue served by the index
    pub world_path: Option<String>,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 5000,
            backlog: 50,
            max_events: 1024,
            max_connections: 10000,
            max_response_ids: 64 * 1024, // 256KB of ids
            poll_timeout_ms: 100,
            tcp_nodelay: true,
            world_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Keys missing from the file keep their default values.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use cityslicker_server::Config;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::from_file("cityslicker.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backlog <= 0 {
            anyhow::bail!("backlog must be > 0");
        }

        if self.max_events == 0 {
            anyhow::bail!("max_events must be > 0");
        }

        if self.max_connections == 0 {
            anyhow::bail!("max_connections must be > 0");
        }

        if self.max_response_ids == 0 {
            anyhow::bail!("max_response_ids must be > 0");
        }

        self.socket_addr()?;

        Ok(())
    }

    /// Address the listener binds to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid bind_addr '{}': {}", self.bind_addr, e))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Wait timeout used by the run loop
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}
