//!
//! The async driver around [`Machine`]: launches each returned effect as a
//! tokio task and funnels its completion back through one serial event
//! queue. Events are processed one at a time to completion, so concurrency
//! is cooperative interleaving and no locks are needed anywhere.
//!

use std::path::Path;

use tokio::sync::mpsc;

use namekit_common::identity::Identity;
use namekit_common::keys::Keypair;
use namekit_common::record::export_file_name;

use crate::client::{Connector, PublishOptions};
use crate::import::decode_record_file;
use crate::machine::{Context, Effect, Event, Machine, SessionError, State};

/// Owns a [`Machine`] and runs its effects on tokio. Must be created and
/// driven from within a tokio runtime.
///
/// In-flight tasks are not cancelled when the machine moves on; their
/// eventual completion is fed through [`Machine::handle`], which discards
/// anything stale.
pub struct Session {
    machine: Machine,
    completed: mpsc::UnboundedSender<Event>,
    completions: mpsc::UnboundedReceiver<Event>,
    in_flight: usize,
}

impl Session {
    /// Start a session. `connector` is awaited once to initialize the
    /// client; a failure degrades into `Inspect` instead of blocking.
    pub fn new(connector: Connector) -> Self {
        let (completed, completions) = mpsc::unbounded_channel();
        let (machine, effects) = Machine::new(connector);
        let mut session = Session {
            machine,
            completed,
            completions,
            in_flight: 0,
        };
        session.launch(effects);
        session
    }

    pub fn state(&self) -> State {
        self.machine.state()
    }

    pub fn context(&self) -> &Context {
        self.machine.context()
    }

    /// Dispatch one user event.
    pub fn dispatch(&mut self, event: Event) {
        let effects = self.machine.handle(event);
        self.launch(effects);
    }

    /// Feed a record file picked by the user into the import transition.
    /// The identity may be inferred from the file's base name.
    pub fn import_record_file(&mut self, file_name: &str, bytes: Vec<u8>) {
        let file_stem = Path::new(file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(file_name)
            .to_string();
        self.dispatch(Event::ImportRecordFile { bytes, file_stem });
    }

    /// The current record as an exportable file, named after the name it
    /// is displayed under.
    pub fn export_record(&self) -> Option<(String, Vec<u8>)> {
        let context = self.machine.context();
        let record = context.record.as_ref()?;
        if context.name.is_empty() {
            return None;
        }
        Some((export_file_name(&context.name), record.encode()))
    }

    /// Drive the session until no task is in flight.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            let Some(event) = self.completions.recv().await else {
                break;
            };
            self.in_flight -= 1;
            let effects = self.machine.handle(event);
            self.launch(effects);
        }
    }

    fn launch(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.in_flight += 1;
            let done = self.completed.clone();
            match effect {
                Effect::InitClient {
                    generation,
                    connector,
                } => {
                    tokio::spawn(async move {
                        let result = connector.await;
                        if let Err(error) = &result {
                            tracing::warn!(%error, "client initialization failed");
                        }
                        let _ = done.send(Event::ClientReady { generation, result });
                    });
                }
                Effect::Fetch {
                    generation,
                    name,
                    client,
                } => {
                    tokio::spawn(async move {
                        tracing::debug!(%name, "resolving");
                        let result = match Identity::parse(&name) {
                            Ok(identity) => {
                                client.resolve(&identity).await.map_err(SessionError::from)
                            }
                            Err(error) => Err(error.into()),
                        };
                        let _ = done.send(Event::FetchCompleted {
                            generation,
                            name,
                            result,
                        });
                    });
                }
                Effect::GenerateKey { generation } => {
                    tokio::spawn(async move {
                        let result = Keypair::generate();
                        let _ = done.send(Event::KeyGenerated { generation, result });
                    });
                }
                Effect::BuildRecord {
                    generation,
                    publish,
                    keypair,
                    form,
                    client,
                } => {
                    tokio::spawn(async move {
                        tracing::debug!(publish, value = %form.value, "building record");
                        let options = PublishOptions {
                            lifetime_ms: form.lifetime_ms,
                            ttl_ms: form.ttl_ms,
                            offline: !publish,
                        };
                        let result = client
                            .publish(&keypair, &form.value, options)
                            .await
                            .map_err(SessionError::from);
                        let _ = done.send(Event::RecordBuilt {
                            generation,
                            published: publish,
                            result,
                        });
                    });
                }
                Effect::Republish {
                    generation,
                    name,
                    record,
                    client,
                } => {
                    tokio::spawn(async move {
                        tracing::debug!(%name, "republishing");
                        let result = match Identity::parse(&name) {
                            Ok(identity) => client
                                .republish(&identity, &record)
                                .await
                                .map_err(SessionError::from),
                            Err(error) => Err(error.into()),
                        };
                        let _ = done.send(Event::RepublishCompleted { generation, result });
                    });
                }
                Effect::DecodeRecordFile {
                    generation,
                    bytes,
                    file_stem,
                } => {
                    tokio::spawn(async move {
                        let result = decode_record_file(&bytes, &file_stem);
                        let _ = done.send(Event::RecordImported { generation, result });
                    });
                }
                Effect::ImportKey { generation, encoded } => {
                    tokio::spawn(async move {
                        let result = Keypair::from_encoded(&encoded);
                        let _ = done.send(Event::KeyImported { generation, result });
                    });
                }
            }
        }
    }
}
