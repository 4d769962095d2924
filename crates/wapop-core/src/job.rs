//! Actuation job description.
//!
//! The job runs one privileged container on the node's host network which toggles the
//! access point through NetworkManager over the host's system D-Bus socket.

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapKeySelector, ConfigMapVolumeSource, Container, EnvFromSource, EnvVar, EnvVarSource,
    HostPathVolumeSource, PodSpec, PodTemplateSpec, SecretEnvSource, SecurityContext, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;

use crate::config::OperatorConfig;

pub const CONTAINER_NAME: &str = "configure";
/// ConfigMap key exported to the job as the `ssid` variable.
pub const SSID_KEY: &str = "ssid";

const NETWORK_MANAGER_DIR: &str = "/etc/NetworkManager";
const DBUS_SOCKET: &str = "/var/run/dbus/system_bus_socket";
const SCRIPTS_DIR: &str = "/app";
const SCRIPTS_MODE: i32 = 0o755;

/// Build the one-shot job that applies `activate` on `node_name`.
///
/// The job is controlled by `owner` (the node's access point) from creation on, runs a
/// single attempt and is garbage collected `config.job_ttl` after it finishes.
pub fn build_job(
    config: &OperatorConfig,
    node_name: &str,
    activate: bool,
    owner: OwnerReference,
) -> Job {
    let script = config.script_for(activate);
    Job {
        metadata: ObjectMeta {
            name: Some(config.job_name(node_name)),
            namespace: Some(config.namespace.clone()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            ttl_seconds_after_finished: Some(config.job_ttl.as_secs().try_into().unwrap_or(i32::MAX)),
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    node_name: Some(node_name.to_string()),
                    host_network: Some(true),
                    restart_policy: Some("Never".into()),
                    containers: vec![container(config, script)],
                    volumes: Some(volumes(config)),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn container(config: &OperatorConfig, script: &str) -> Container {
    Container {
        name: CONTAINER_NAME.into(),
        image: Some(config.image.clone()),
        command: Some(vec!["/bin/sh".into(), "-c".into(), script.into()]),
        security_context: Some(SecurityContext {
            privileged: Some(true),
            ..Default::default()
        }),
        volume_mounts: Some(vec![
            mount("host-etc-nm", NETWORK_MANAGER_DIR),
            mount("dbus-socket", DBUS_SOCKET),
            mount("scripts", SCRIPTS_DIR),
        ]),
        env: Some(vec![EnvVar {
            name: SSID_KEY.into(),
            value: None,
            value_from: Some(EnvVarSource {
                config_map_key_ref: Some(ConfigMapKeySelector {
                    key: SSID_KEY.into(),
                    name: config.settings_name.clone(),
                    optional: None,
                }),
                ..Default::default()
            }),
        }]),
        // Every secret key becomes a variable without copying values into the job.
        env_from: Some(vec![EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: config.settings_name.clone(),
                optional: None,
            }),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.into(),
        mount_path: path.into(),
        ..Default::default()
    }
}

fn volumes(config: &OperatorConfig) -> Vec<Volume> {
    vec![
        host_path("host-etc-nm", NETWORK_MANAGER_DIR),
        host_path("dbus-socket", DBUS_SOCKET),
        Volume {
            name: "scripts".into(),
            config_map: Some(ConfigMapVolumeSource {
                name: config.scripts_config_map.clone(),
                default_mode: Some(SCRIPTS_MODE),
                ..Default::default()
            }),
            ..Default::default()
        },
    ]
}

fn host_path(name: &str, path: &str) -> Volume {
    Volume {
        name: name.into(),
        host_path: Some(HostPathVolumeSource {
            path: path.into(),
            type_: None,
        }),
        ..Default::default()
    }
}
