//! Cup Configuration Manager
//!
//! Activates cup / sub-cup configuration pairs, toggles ion-counter collectors
//! and answers the configuration queries of the protocol. Configuration data
//! belongs to the instrument; this manager only reads snapshots and requests
//! changes through the session.

use std::sync::Arc;

use crate::config::CupsConfig;
use crate::error::{RcsError, RcsResult};
use crate::hardware::{CupConfiguration, InstrumentSession};
use crate::parameter::{format_value, ParameterGateway};

/// Cup and sub-cup activation on top of the instrument session
pub struct CupConfigurationManager {
    session: Arc<dyn InstrumentSession>,
    gateway: ParameterGateway,
    config: CupsConfig,
}

impl CupConfigurationManager {
    /// Manager over the gateway's session
    pub fn new(gateway: ParameterGateway, config: CupsConfig) -> Self {
        Self {
            session: Arc::clone(gateway.session()),
            gateway,
            config,
        }
    }

    async fn configurations(&self) -> RcsResult<Vec<CupConfiguration>> {
        self.session
            .cup_configurations()
            .await
            .map_err(|e| {
                RcsError::ConfigurationLookup(format!("could not list cup configurations: {e}"))
            })
    }

    /// Look up a cup configuration by exact name
    pub async fn find_cup(&self, name: &str) -> RcsResult<CupConfiguration> {
        self.configurations()
            .await?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| {
                tracing::error!("Could not find cup configuration '{}'", name);
                RcsError::ConfigurationLookup(format!("could not find cup configuration {name}"))
            })
    }

    /// Make `(cup_name, sub_cup_name)` the active pair and switch the hardware
    pub async fn activate(&self, cup_name: &str, sub_cup_name: &str) -> RcsResult<()> {
        let cup = self.find_cup(cup_name).await?;
        let sub = cup.find_sub_cup(sub_cup_name).ok_or_else(|| {
            tracing::error!(
                "Could not find sub cup configuration '{}' in cup configuration '{}'",
                sub_cup_name,
                cup_name
            );
            RcsError::ConfigurationLookup(format!(
                "could not find sub cup configuration {sub_cup_name} in {cup_name}"
            ))
        })?;

        self.session
            .set_active_configuration(&cup.identifier, &sub.identifier)
            .await
            .map_err(|e| RcsError::ConfigurationLookup(e.to_string()))?;

        if let Err(e) = self
            .session
            .set_hardware_parameters(&cup.identifier, &sub.identifier)
            .await
        {
            tracing::error!(error = %e, "Could not push cup configuration hardware parameters");
            return Err(RcsError::CupChangeRejected);
        }

        if let Err(e) = self.session.request_cup_configuration_change().await {
            tracing::error!(error = %e, "Could not request a cup configuration change");
            return Err(RcsError::CupChangeRejected);
        }

        tracing::info!(cup = cup_name, sub_cup = sub_cup_name, "Cup configuration activated");
        Ok(())
    }

    /// Activate a sub-cup within the configured default cup configuration
    pub async fn activate_sub_cup(&self, sub_cup_name: &str) -> RcsResult<()> {
        self.activate(&self.config.cup_configuration, sub_cup_name).await
    }

    /// Snapshot of the active cup configuration
    pub async fn active_cup_configuration(&self) -> RcsResult<CupConfiguration> {
        let (cup_name, _) = self.active_names().await?;
        self.find_cup(&cup_name).await
    }

    /// Names of the active cup and sub-cup configuration
    pub async fn active_names(&self) -> RcsResult<(String, String)> {
        self.session
            .active_configuration()
            .await
            .map_err(|e| RcsError::ConfigurationLookup(format!("no active cup configuration: {e}")))
    }

    /// Name of the active cup configuration
    pub async fn active_cup_name(&self) -> RcsResult<String> {
        Ok(self.active_names().await?.0)
    }

    /// Name of the active sub-cup configuration
    pub async fn active_sub_cup_name(&self) -> RcsResult<String> {
        Ok(self.active_names().await?.1)
    }

    /// Set `active` on every counter cup with an assigned mass in the active
    /// configuration. Returns how many collectors were changed.
    pub async fn set_ion_counter_state(&self, active: bool) -> RcsResult<usize> {
        tracing::info!("Setting IonCounterState {}", active);
        let cup = self.active_cup_configuration().await?;
        let mut changed = 0;
        for item in cup.collector_items.iter().filter(|c| c.is_connected_counter()) {
            match self
                .session
                .set_collector_active(&cup.identifier, &item.identifier, active)
                .await
            {
                Ok(()) => changed += 1,
                Err(e) => {
                    tracing::warn!(collector = %item.identifier, error = %e, "Could not toggle collector")
                }
            }
        }
        Ok(changed)
    }

    /// Names of every cup configuration
    pub async fn cup_configuration_names(&self) -> RcsResult<Vec<String>> {
        Ok(self.configurations().await?.into_iter().map(|c| c.name).collect())
    }

    /// Sub-cup names of the named cup configuration
    pub async fn sub_cup_configuration_names(&self, cup_name: &str) -> RcsResult<Vec<String>> {
        Ok(self
            .find_cup(cup_name)
            .await?
            .sub_cup_configurations
            .into_iter()
            .map(|s| s.name)
            .collect())
    }

    /// `name,value` pairs joined by `;` for the configured sub-cup parameters.
    /// Unreadable parameters are left out.
    pub async fn sub_cup_parameters(&self) -> String {
        let mut entries = Vec::with_capacity(self.config.sub_cup_parameters.len());
        for name in &self.config.sub_cup_parameters {
            if let Ok(value) = self.gateway.read(name).await {
                entries.push(format!("{},{}", name, format_value(value)));
            }
        }
        entries.join(";")
    }
}
