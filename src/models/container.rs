use crate::config::error::{ConfigError, ConfigResult};
use crate::config::Config;

/// Everything needed to create the throwaway database container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<(String, String)>,
    pub ports: Vec<PortMapping>,
}

/// Identifies a container this run created and is responsible for removing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// One `remote_port=local_port` forwarding rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub port: u16,
    pub protocol: Protocol,
    pub host_port: u16,
}

impl PortMapping {
    /// Build a mapping from a container port spec such as `5432` or `5432/tcp`.
    pub fn new(container_port: &str, host_port: u16) -> ConfigResult<Self> {
        let (port, protocol) = match container_port.split_once('/') {
            Some((port, "tcp")) => (port, Protocol::Tcp),
            Some((port, "udp")) => (port, Protocol::Udp),
            Some(_) => return Err(bad_container_port(container_port, "unknown protocol")),
            None => (container_port, Protocol::Tcp),
        };
        let port = port
            .parse()
            .map_err(|_| bad_container_port(container_port, "not a port number"))?;

        Ok(Self {
            port,
            protocol,
            host_port,
        })
    }

    /// Container port key in Docker's `port/protocol` form.
    pub fn container_port(&self) -> String {
        format!("{}/{}", self.port, self.protocol.as_str())
    }
}

fn bad_container_port(entry: &str, reason: &str) -> ConfigError {
    ConfigError::MalformedList {
        field: "port_mapping".to_string(),
        entry: entry.to_string(),
        reason: reason.to_string(),
    }
}

impl ContainerSpec {
    /// Environment in the `KEY=value` form the Docker API expects.
    pub fn env_list(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

impl From<&Config> for ContainerSpec {
    fn from(config: &Config) -> Self {
        Self {
            name: config.container_name.clone(),
            image: config.image_name.clone(),
            env: config.container_env.clone(),
            ports: config.port_mapping.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_list_keeps_order() {
        let spec = ContainerSpec {
            name: "dbless".to_string(),
            image: "postgres:14.5-alpine".to_string(),
            env: vec![
                ("POSTGRES_USER".to_string(), "app".to_string()),
                ("POSTGRES_PASSWORD".to_string(), "123456".to_string()),
            ],
            ports: Vec::new(),
        };
        assert_eq!(
            spec.env_list(),
            vec!["POSTGRES_USER=app", "POSTGRES_PASSWORD=123456"]
        );
    }

    #[test]
    fn bare_container_port_defaults_to_tcp() {
        let mapping = PortMapping::new("5432", 15432).unwrap();
        assert_eq!(mapping.protocol, Protocol::Tcp);
        assert_eq!(mapping.container_port(), "5432/tcp");
    }
}
