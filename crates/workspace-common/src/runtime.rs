//! Component statuses and the consumer-facing runtime descriptor
//!
//! Both travel through `WorkspaceStatus::additional_info` as JSON strings for
//! compatibility with existing consumers. They are decoded into these types at
//! the boundary and never handled as raw JSON inside the controller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{COMPONENT_STATUSES_KEY, RUNTIME_KEY};

/// Environment name reported as `activeEnv`
pub const DEFAULT_ENV: &str = "default";

/// A container declared by a component
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct MachineDescription {
    /// Machine attributes copied into the runtime descriptor
    #[serde(default, alias = "machineAttributes")]
    pub attributes: BTreeMap<String, String>,
    /// Ports the container listens on
    #[serde(default)]
    pub ports: Vec<i32>,
}

/// An endpoint declared by a component
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentEndpoint {
    /// Endpoint name
    pub name: String,
    /// Container port the endpoint targets
    #[serde(default)]
    pub target_port: i32,
    /// Endpoint attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// A command a component contributes to the workspace runtime
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Command name
    pub name: String,
    /// Command type (e.g. `exec`)
    #[serde(rename = "type", default)]
    pub type_: String,
    /// Command line to run
    #[serde(default)]
    pub command_line: String,
    /// Command attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Per-component provisioning result recorded by the provisioning layer
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInstanceStatus {
    /// Containers of this component keyed by machine name
    #[serde(default, alias = "machines")]
    pub container_descriptions: BTreeMap<String, MachineDescription>,
    /// Endpoints declared by this component
    #[serde(default)]
    pub endpoints: Vec<ComponentEndpoint>,
    /// Commands contributed to the runtime
    #[serde(default)]
    pub contributed_runtime_commands: Vec<Command>,
}

/// Status of a runtime server
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    /// Server is serving
    Running,
    /// Readiness has not been probed
    #[default]
    Unknown,
}

/// A reachable server of a machine
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Server {
    /// Server URL
    pub url: String,
    /// Server status
    pub status: ServerStatus,
    /// Server attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// A machine of the runtime with its servers
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Machine {
    /// Machine attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Servers keyed by endpoint name
    #[serde(default)]
    pub servers: BTreeMap<String, Server>,
}

/// Merged view of machines, servers and commands of a running workspace
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeDescriptor {
    /// Active environment name
    pub active_env: String,
    /// Commands contributed by all components
    #[serde(default)]
    pub commands: Vec<Command>,
    /// Machines keyed by name
    #[serde(default)]
    pub machines: BTreeMap<String, Machine>,
}

impl RuntimeDescriptor {
    /// Build a descriptor from scratch out of the recorded component statuses.
    ///
    /// `servers_for` receives each declared machine name and returns the
    /// servers to publish for it. Commands are concatenated in component order.
    pub fn assemble<F>(statuses: &[ComponentInstanceStatus], mut servers_for: F) -> Self
    where
        F: FnMut(&str) -> BTreeMap<String, Server>,
    {
        let mut commands = Vec::new();
        let mut machines = BTreeMap::new();

        for status in statuses {
            commands.extend(status.contributed_runtime_commands.iter().cloned());
            for (machine_name, description) in &status.container_descriptions {
                machines.insert(
                    machine_name.clone(),
                    Machine {
                        attributes: description.attributes.clone(),
                        servers: servers_for(machine_name),
                    },
                );
            }
        }

        Self {
            active_env: DEFAULT_ENV.to_string(),
            commands,
            machines,
        }
    }
}

/// Read the component statuses recorded in `additionalInfo`.
///
/// Returns `Ok(None)` when nothing has been recorded yet.
pub fn read_component_statuses(
    additional_info: &BTreeMap<String, String>,
) -> Result<Option<Vec<ComponentInstanceStatus>>, serde_json::Error> {
    match additional_info.get(COMPONENT_STATUSES_KEY) {
        Some(raw) if !raw.is_empty() => serde_json::from_str(raw).map(Some),
        _ => Ok(None),
    }
}

/// Record component statuses in `additionalInfo`, or remove the key for `None`
pub fn write_component_statuses(
    additional_info: &mut BTreeMap<String, String>,
    statuses: Option<&[ComponentInstanceStatus]>,
) -> Result<(), serde_json::Error> {
    match statuses {
        Some(statuses) => {
            additional_info.insert(
                COMPONENT_STATUSES_KEY.to_string(),
                serde_json::to_string(statuses)?,
            );
        }
        None => {
            additional_info.remove(COMPONENT_STATUSES_KEY);
        }
    }
    Ok(())
}

/// Read the runtime descriptor published in `additionalInfo`
pub fn read_runtime(
    additional_info: &BTreeMap<String, String>,
) -> Result<Option<RuntimeDescriptor>, serde_json::Error> {
    additional_info
        .get(RUNTIME_KEY)
        .map(|raw| serde_json::from_str(raw))
        .transpose()
}

/// Publish the runtime descriptor in `additionalInfo`
pub fn write_runtime(
    additional_info: &mut BTreeMap<String, String>,
    runtime: &RuntimeDescriptor,
) -> Result<(), serde_json::Error> {
    additional_info.insert(RUNTIME_KEY.to_string(), serde_json::to_string(runtime)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(machine: &str, command: &str) -> ComponentInstanceStatus {
        ComponentInstanceStatus {
            container_descriptions: BTreeMap::from([(
                machine.to_string(),
                MachineDescription {
                    attributes: BTreeMap::from([("source".to_string(), "tool".to_string())]),
                    ports: vec![3100],
                },
            )]),
            endpoints: vec![],
            contributed_runtime_commands: vec![Command {
                name: command.to_string(),
                type_: "exec".to_string(),
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_assemble_concatenates_commands_and_machines() {
        let statuses = vec![component("theia", "build"), component("node", "run")];
        let runtime = RuntimeDescriptor::assemble(&statuses, |_| BTreeMap::new());

        assert_eq!(runtime.active_env, "default");
        let names: Vec<_> = runtime.commands.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["build", "run"]);
        assert_eq!(runtime.machines.len(), 2);
        assert_eq!(runtime.machines["theia"].attributes["source"], "tool");
    }

    #[test]
    fn test_assemble_asks_for_servers_per_machine() {
        let statuses = vec![component("theia", "build")];
        let runtime = RuntimeDescriptor::assemble(&statuses, |machine| {
            BTreeMap::from([(
                format!("{machine}-server"),
                Server {
                    url: "https://x".to_string(),
                    ..Default::default()
                },
            )])
        });
        assert!(runtime.machines["theia"].servers.contains_key("theia-server"));
    }

    #[test]
    fn test_runtime_serializes_consumer_schema() {
        let runtime = RuntimeDescriptor::assemble(&[component("theia", "build")], |_| {
            BTreeMap::from([(
                "ide".to_string(),
                Server {
                    url: "https://ide".to_string(),
                    status: ServerStatus::Unknown,
                    attributes: BTreeMap::new(),
                },
            )])
        });
        let json = serde_json::to_value(&runtime).unwrap();
        assert_eq!(json["activeEnv"], "default");
        assert_eq!(json["machines"]["theia"]["servers"]["ide"]["status"], "UNKNOWN");
        assert_eq!(json["commands"][0]["type"], "exec");
        assert_eq!(json["commands"][0]["commandLine"], "");
    }

    #[test]
    fn test_component_statuses_accept_legacy_field_names() {
        let raw = r#"[{"machines": {"theia": {"machineAttributes": {"a": "b"}, "ports": [80]}}}]"#;
        let info = BTreeMap::from([(COMPONENT_STATUSES_KEY.to_string(), raw.to_string())]);
        let statuses = read_component_statuses(&info).unwrap().unwrap();
        assert_eq!(statuses[0].container_descriptions["theia"].attributes["a"], "b");
        assert_eq!(statuses[0].container_descriptions["theia"].ports, vec![80]);
    }

    #[test]
    fn test_component_statuses_missing_and_invalid() {
        let mut info = BTreeMap::new();
        assert!(read_component_statuses(&info).unwrap().is_none());

        info.insert(COMPONENT_STATUSES_KEY.to_string(), "{not json".to_string());
        assert!(read_component_statuses(&info).is_err());
    }

    #[test]
    fn test_write_component_statuses_none_removes_key() {
        let mut info = BTreeMap::new();
        write_component_statuses(&mut info, Some(&[component("theia", "build")])).unwrap();
        let stored = read_component_statuses(&info).unwrap().unwrap();
        assert_eq!(stored.len(), 1);

        write_component_statuses(&mut info, None).unwrap();
        assert!(!info.contains_key(COMPONENT_STATUSES_KEY));
    }

    #[test]
    fn test_write_then_read_runtime() {
        let mut info = BTreeMap::new();
        let runtime = RuntimeDescriptor::assemble(&[component("theia", "build")], |_| {
            BTreeMap::new()
        });
        write_runtime(&mut info, &runtime).unwrap();
        assert_eq!(read_runtime(&info).unwrap(), Some(runtime));
    }
}
