//! Replay application: configuration, event stream and final report.

use crate::cli::CliArgs;
use crate::replica::ReplicaRegistry;
use do_hierarchy::{DispatcherAdapter, DoHierarchy, HierarchyConfig, HierarchyError, LifecycleEvent, ZonePolicy};
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

/// Counters reported after a replay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Non-blank lines read
    pub events: usize,
    /// Events that left the hierarchy consistent with the dispatcher
    pub applied: usize,
    /// Events rejected with a hard failure
    pub failed: usize,
    /// Lines that did not parse as a lifecycle event
    pub skipped: usize,
    /// Ids registered once the stream ends
    pub registered: usize,
}

/// Owns the hierarchy, its dispatcher adapter and the replica objects.
pub struct Application {
    config: HierarchyConfig,
    adapter: DispatcherAdapter<ReplicaRegistry>,
    replicas: ReplicaRegistry,
    events_path: Option<PathBuf>,
    dump: bool,
}

impl Application {
    /// Creates the application from the configuration file named by `args`.
    ///
    /// # Arguments
    ///
    /// * `args` - Parsed command-line arguments
    ///
    /// # Returns
    ///
    /// A ready `Application`, or an error if the file could not be read or
    /// the merged configuration is invalid.
    ///
    /// A missing file is created with the default configuration. Command-line
    /// overrides are applied on top of the file before validation.
    pub fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let config = HierarchyConfig::load_from_file(&args.config_path)?;
        Self::with_config(args, config)
    }

    /// Builds the application from an already loaded configuration.
    ///
    /// CLI overrides are applied before validation.
    pub fn with_config(
        args: CliArgs,
        mut config: HierarchyConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        apply_overrides(&mut config, &args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }

        let replicas = ReplicaRegistry::new();
        let hierarchy = DoHierarchy::with_config(&config)?;
        let adapter = DispatcherAdapter::with_zone_policy(
            hierarchy,
            replicas.clone(),
            ZonePolicy::from_settings(&config.zone_policy),
        );

        Ok(Self {
            config,
            adapter,
            replicas,
            events_path: args.events_path,
            dump: args.dump,
        })
    }

    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    pub fn adapter(&self) -> &DispatcherAdapter<ReplicaRegistry> {
        &self.adapter
    }

    pub fn replicas(&self) -> &ReplicaRegistry {
        &self.replicas
    }

    /// Replays the configured event source and reports the result.
    ///
    /// Reads the `--events` file, or standard input when none was given. With
    /// `--dump` the final hierarchy is printed to standard output as JSON.
    pub async fn run(mut self) -> Result<ReplaySummary, Box<dyn std::error::Error>> {
        if self.adapter.hierarchy().tolerate_missing_on_delete() {
            info!("Deletes of unknown ids are traced, not reported");
        }
        let summary = match self.events_path.clone() {
            Some(path) => {
                info!("Replaying events from {}", path.display());
                let file = tokio::fs::File::open(&path).await?;
                self.replay(BufReader::new(file)).await?
            }
            None => {
                info!("Replaying events from standard input");
                self.replay(BufReader::new(tokio::io::stdin())).await?
            }
        };

        info!(
            "Replay finished: {} events | {} applied | {} failed | {} skipped | {} registered",
            summary.events, summary.applied, summary.failed, summary.skipped, summary.registered
        );

        if self.dump {
            let snapshot = self.adapter.hierarchy().snapshot()?;
            if snapshot.is_empty() {
                info!("Hierarchy is empty after replay");
            }
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Ok(summary)
    }

    /// Applies every JSON line of `reader` in order.
    ///
    /// Hard failures are counted and the replay continues; a poisoned
    /// hierarchy stops it.
    pub async fn replay<R>(&mut self, reader: R) -> Result<ReplaySummary, Box<dyn std::error::Error>>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut summary = ReplaySummary::default();
        let mut lines = reader.lines();
        let mut line_number = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            summary.events += 1;

            let event: LifecycleEvent = match serde_json::from_str(line) {
                Ok(event) => event,
                Err(e) => {
                    warn!("line {line_number}: not a lifecycle event: {e}");
                    summary.skipped += 1;
                    continue;
                }
            };

            match self.apply(&event) {
                Ok(()) => summary.applied += 1,
                Err(HierarchyError::Poisoned) => {
                    error!("line {line_number}: hierarchy poisoned, stopping replay");
                    return Err(HierarchyError::Poisoned.into());
                }
                Err(e) => {
                    warn!("line {line_number}: {e}");
                    summary.failed += 1;
                }
            }
        }

        summary.registered = self.adapter.hierarchy().size()?;
        Ok(summary)
    }

    /// Applies one event, keeping the replica registry in step.
    pub fn apply(&mut self, event: &LifecycleEvent) -> Result<(), HierarchyError> {
        match event {
            LifecycleEvent::Generated { id, dclass, .. } => {
                self.replicas.spawn(*id, dclass);
                self.adapter.handle(event)
            }
            LifecycleEvent::Deleted { id, .. } => {
                self.adapter.handle(event)?;
                // A rejected delete leaves the id registered and resolvable.
                if !self.adapter.hierarchy().contains(*id)? {
                    self.replicas.despawn(*id);
                }
                Ok(())
            }
            LifecycleEvent::Relocated { .. } => self.adapter.handle(event),
        }
    }
}

/// Applies command-line overrides on top of file configuration.
fn apply_overrides(config: &mut HierarchyConfig, args: &CliArgs) {
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    if args.tolerant {
        config.tolerate_missing_on_delete = true;
    }
}
