#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
    Unknown(String),
}

impl ContainerState {
    /// Maps the engine's `State.Status` string
    pub fn from_status(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// States in which the container process may still produce output
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Restarting)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub state: ContainerState,
    pub exit_code: Option<i64>,
}

impl Container {
    pub fn new(id: String, name: String, state: ContainerState) -> Self {
        Self {
            id,
            name,
            state,
            exit_code: None,
        }
    }

    pub fn with_exit_code(mut self, code: i64) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn is_running(&self) -> bool {
        self.state.is_active()
    }
}

pub const RESTART_POLICY: &str = "no";
pub const NETWORK: &str = "bridge";
pub const LOG_DRIVER: &str = "json-file";

#[derive(Debug, Clone)]
pub struct ContainerSpec<'a> {
    pub name: &'a str,
    pub image: &'a str,
    pub env: &'a [String],
    /// Published on 0.0.0.0 with the same host and container port
    pub port: Option<u16>,
    /// Replaces the image entrypoint; the first element becomes `--entrypoint`
    pub entrypoint: Option<&'a [String]>,
    pub restart_policy: &'a str,
    pub network: &'a str,
    pub log_driver: &'a str,
}

impl<'a> ContainerSpec<'a> {
    pub fn new(name: &'a str, image: &'a str) -> Self {
        Self {
            name,
            image,
            env: &[],
            port: None,
            entrypoint: None,
            restart_policy: RESTART_POLICY,
            network: NETWORK,
            log_driver: LOG_DRIVER,
        }
    }

    pub fn env(mut self, env: &'a [String]) -> Self {
        self.env = env;
        self
    }

    pub fn port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    pub fn entrypoint(mut self, argv: &'a [String]) -> Self {
        self.entrypoint = Some(argv);
        self
    }
}
