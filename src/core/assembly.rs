use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use tracing::info;

use crate::config::Config;
use crate::core::host::{Host, HostRef};
use crate::core::runtime::{ComposeOptions, Composition, Runtime};
use crate::core::value::Value;

/// A declared host type together with the sample instance built from it
#[derive(Debug, Clone)]
pub struct AssembledHost {
    pub host_type: HostRef,
    pub instance: HostRef,
}

/// Hosts and compositions built from a [`Config`]
pub struct Assembly {
    pub runtime: Runtime,
    pub hosts: BTreeMap<String, AssembledHost>,
    pub compositions: Vec<(String, Composition)>,
}

impl Assembly {
    /// Build every declared host and apply every declared composition in order
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut runtime = Runtime::with_settings(config.get_sandbox_settings());
        let mut hosts = BTreeMap::new();

        for host_config in &config.hosts {
            if hosts.contains_key(&host_config.name) {
                bail!("Host '{}' is declared more than once", host_config.name);
            }
            let host_type = Host::new_type(host_config.name.clone());
            let instance = Host::instantiate_with(
                &host_type,
                host_config
                    .fields
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::from(value))),
            );
            hosts.insert(
                host_config.name.clone(),
                AssembledHost {
                    host_type,
                    instance,
                },
            );
        }

        let mut compositions = Vec::with_capacity(config.compositions.len());
        for composition in &config.compositions {
            let host = hosts.get(&composition.host).with_context(|| {
                format!(
                    "Composition of '{}' targets undeclared host '{}'",
                    composition.module, composition.host
                )
            })?;
            let names: Vec<&str> = composition.expose.iter().map(String::as_str).collect();
            let options = ComposeOptions {
                class: composition.class,
            };

            let installed = runtime
                .compose_registered(&host.host_type, &composition.module, &names, options)
                .with_context(|| {
                    format!(
                        "Failed to compose '{}' onto '{}'",
                        composition.module, composition.host
                    )
                })?;

            info!(
                "Composed {} onto {} ({} method(s))",
                composition.module,
                composition.host,
                installed.exposed.len()
            );
            compositions.push((composition.host.clone(), installed));
        }

        Ok(Self {
            runtime,
            hosts,
            compositions,
        })
    }

    pub fn host(&self, name: &str) -> Option<&AssembledHost> {
        self.hosts.get(name)
    }
}
