//!
//! The record lifecycle state machine.
//!
//! A closed set of state tags, one context aggregate and a pure transition
//! function: [`Machine::handle`] maps an event to the next state plus a
//! list of side-effect descriptions. Effects are never performed here; the
//! session driver launches them and feeds their completions back in as
//! ordinary events, so the transition logic tests without any network.
//!
//! Every launched task carries the generation counter at launch time. A
//! completion is applied only while the machine is still in the state that
//! awaits it and the generation still matches; anything else is discarded,
//! so a stale completion can never corrupt the context.
//!

use core::fmt;

use namekit_common::identity::{name_from_keypair, Identity, IdentityError};
use namekit_common::keys::{KeyError, Keypair};
use namekit_common::record::{Record, RecordError};

use crate::client::{ClientError, Connector, SharedClient, DEFAULT_LIFETIME_MS, DEFAULT_TTL_MS};

/// One failed operation, kept in the context until the next attempt.
#[derive(thiserror::Error, Debug, Clone)]
pub enum SessionError {
    #[error(transparent)]
    InvalidName(#[from] IdentityError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("could not infer a name from '{0}'")]
    NameInference(String),
    #[error("{0}")]
    Precondition(&'static str),
}

impl SessionError {
    pub fn is_invalid_name(&self) -> bool {
        matches!(self, SessionError::InvalidName(_))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, SessionError::Client(ClientError::Network(_)))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::Client(ClientError::NotFound))
    }

    pub fn is_invalid_signature(&self) -> bool {
        matches!(self, SessionError::Record(RecordError::InvalidSignature))
    }

    pub fn is_name_inference(&self) -> bool {
        matches!(self, SessionError::NameInference(_))
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, SessionError::Precondition(_))
    }
}

/// State tags of the lifecycle orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Connecting the name system client.
    Init,
    /// Idle record-viewing state.
    Inspect,
    /// A resolution task is in flight.
    VerifyAndFetch,
    /// Idle record-authoring state.
    Create,
    /// A key-generation task is in flight.
    GeneratingKey,
    /// An offline record construction task is in flight.
    CreatingRecord,
    /// A construct-and-broadcast task is in flight.
    PublishingRecord,
    /// A re-broadcast of an already-signed record is in flight.
    RepublishingRecord,
    /// A record file is being decoded and validated.
    ImportingRecord,
    /// An encoded private key is being decoded.
    ImportingPrivateKey,
}

/// The two user-facing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Inspect,
    Create,
}

/// Editable fields of the record form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Value,
    Lifetime,
    Ttl,
}

/// Parameters for constructing a new record. Valid defaults are always
/// present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormData {
    pub value: String,
    pub lifetime_ms: u64,
    pub ttl_ms: u64,
}

impl Default for FormData {
    fn default() -> Self {
        Self {
            value: String::new(),
            lifetime_ms: DEFAULT_LIFETIME_MS,
            ttl_ms: DEFAULT_TTL_MS,
        }
    }
}

/// The single mutable aggregate owned by the machine for the lifetime of a
/// session. Mutated exclusively through transition actions; nothing here
/// survives a teardown.
#[derive(Default)]
pub struct Context {
    /// Last operation failure, cleared when the next attempt starts.
    pub error: Option<SessionError>,
    /// The name currently being edited. Can be invalid or unconfirmed.
    pub name_input: String,
    /// The name the displayed record was fetched, created or imported
    /// under; empty whenever that does not apply.
    pub name: String,
    /// Result of the last on-demand validation of `name_input`.
    pub name_validation_error: bool,
    /// The displayed record. At most one at a time.
    pub record: Option<Record>,
    /// The current signing keypair; absent until generated or imported.
    pub keypair: Option<Keypair>,
    /// Transient import-dialog input.
    pub private_key_input: String,
    /// Transient import-dialog failure message.
    pub private_key_error: Option<String>,
    /// Parameters for the next record.
    pub form: FormData,
    /// Set after a successful publish or republish, reset by any
    /// record-mutating transition.
    pub publish_success: bool,
    /// A resolution task is in flight.
    pub fetching_record: bool,
    /// A publish or republish task is in flight.
    pub publishing_record: bool,
    pub import_dialog_open: bool,
    /// The client handle, initialized once at startup and shared read-only
    /// by every operation afterwards.
    pub client: Option<SharedClient>,
    /// Task generation counter; see the module docs.
    pub generation: u64,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("error", &self.error)
            .field("name_input", &self.name_input)
            .field("name", &self.name)
            .field("name_validation_error", &self.name_validation_error)
            .field("record", &self.record)
            .field("keypair", &self.keypair)
            .field("private_key_error", &self.private_key_error)
            .field("form", &self.form)
            .field("publish_success", &self.publish_success)
            .field("fetching_record", &self.fetching_record)
            .field("publishing_record", &self.publishing_record)
            .field("import_dialog_open", &self.import_dialog_open)
            .field("client", &self.client.is_some())
            .field("generation", &self.generation)
            .finish()
    }
}

/// Events the machine consumes: user-triggered ones plus the completions
/// of previously launched tasks.
pub enum Event {
    // User events.
    UpdateForm { field: FormField, value: String },
    UpdateName { value: String, validate: bool },
    UpdatePrivateKeyInput { value: String },
    OpenImportDialog,
    CloseImportDialog,
    InspectName,
    SetMode(Mode),
    CreateRecord,
    PublishRecord,
    GenerateNewKey,
    ImportPrivateKey,
    ImportRecordFile { bytes: Vec<u8>, file_stem: String },

    // Task completions.
    ClientReady {
        generation: u64,
        result: Result<SharedClient, ClientError>,
    },
    FetchCompleted {
        generation: u64,
        /// The name the resolution was launched for. `name_input` may have
        /// been edited since, so the completion carries its own copy.
        name: String,
        result: Result<Record, SessionError>,
    },
    KeyGenerated {
        generation: u64,
        result: Result<Keypair, KeyError>,
    },
    RecordBuilt {
        generation: u64,
        published: bool,
        result: Result<Record, SessionError>,
    },
    RepublishCompleted {
        generation: u64,
        result: Result<(), SessionError>,
    },
    RecordImported {
        generation: u64,
        result: Result<(Record, String), SessionError>,
    },
    KeyImported {
        generation: u64,
        result: Result<Keypair, KeyError>,
    },
}

impl Event {
    fn label(&self) -> &'static str {
        match self {
            Event::UpdateForm { .. } => "update_form",
            Event::UpdateName { .. } => "update_name",
            Event::UpdatePrivateKeyInput { .. } => "update_private_key_input",
            Event::OpenImportDialog => "open_import_dialog",
            Event::CloseImportDialog => "close_import_dialog",
            Event::InspectName => "inspect_name",
            Event::SetMode(_) => "set_mode",
            Event::CreateRecord => "create_record",
            Event::PublishRecord => "publish_record",
            Event::GenerateNewKey => "generate_new_key",
            Event::ImportPrivateKey => "import_private_key",
            Event::ImportRecordFile { .. } => "import_record_file",
            Event::ClientReady { .. } => "client_ready",
            Event::FetchCompleted { .. } => "fetch_completed",
            Event::KeyGenerated { .. } => "key_generated",
            Event::RecordBuilt { .. } => "record_built",
            Event::RepublishCompleted { .. } => "republish_completed",
            Event::RecordImported { .. } => "record_imported",
            Event::KeyImported { .. } => "key_imported",
        }
    }
}

/// Side effects returned by transitions: descriptions of tasks to launch,
/// never performed inline.
pub enum Effect {
    /// Await the connector and report [`Event::ClientReady`].
    InitClient {
        generation: u64,
        connector: Connector,
    },
    /// Parse `name` and resolve it to its current record.
    Fetch {
        generation: u64,
        name: String,
        client: SharedClient,
    },
    /// Generate a fresh signing keypair.
    GenerateKey { generation: u64 },
    /// Construct and sign a record from the form; broadcast it when
    /// `publish` is set.
    BuildRecord {
        generation: u64,
        publish: bool,
        keypair: Keypair,
        form: FormData,
        client: SharedClient,
    },
    /// Re-broadcast an already-signed record under `name`.
    Republish {
        generation: u64,
        name: String,
        record: Record,
        client: SharedClient,
    },
    /// Decode and validate a user-supplied record file.
    DecodeRecordFile {
        generation: u64,
        bytes: Vec<u8>,
        file_stem: String,
    },
    /// Decode an encoded private key.
    ImportKey { generation: u64, encoded: String },
}

/// The lifecycle orchestrator: current state plus the session context.
pub struct Machine {
    state: State,
    context: Context,
}

impl Machine {
    /// Create the machine in `Init` and return the client-connection
    /// effect the driver must launch. `connector` rides along inside the
    /// effect and is awaited once by that task.
    pub fn new(connector: Connector) -> (Self, Vec<Effect>) {
        let mut machine = Machine {
            state: State::Init,
            context: Context::default(),
        };
        let generation = machine.bump_generation();
        (
            machine,
            vec![Effect::InitClient {
                generation,
                connector,
            }],
        )
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Feed one event; returns the side effects to launch.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        // Global transitions: state independent, never launch tasks.
        let event = match event {
            Event::UpdateForm { field, value } => {
                self.update_form(field, value);
                return Vec::new();
            }
            Event::UpdateName { value, validate } => {
                self.context.name_input = value;
                // Deferred until blur so the message does not flicker while
                // the user is still typing.
                if validate {
                    self.context.name_validation_error =
                        Identity::parse(&self.context.name_input).is_err();
                }
                return Vec::new();
            }
            Event::UpdatePrivateKeyInput { value } => {
                self.context.private_key_input = value;
                return Vec::new();
            }
            Event::OpenImportDialog => {
                self.context.import_dialog_open = true;
                return Vec::new();
            }
            Event::CloseImportDialog => {
                self.context.import_dialog_open = false;
                self.context.private_key_input.clear();
                self.context.private_key_error = None;
                return Vec::new();
            }
            other => other,
        };

        match self.state {
            State::Init => self.handle_init(event),
            State::Inspect => self.handle_inspect(event),
            State::VerifyAndFetch => self.handle_fetch(event),
            State::Create => self.handle_create(event),
            State::GeneratingKey => self.handle_generating_key(event),
            State::CreatingRecord | State::PublishingRecord => self.handle_record_built(event),
            State::RepublishingRecord => self.handle_republish(event),
            State::ImportingRecord => self.handle_importing_record(event),
            State::ImportingPrivateKey => self.handle_importing_key(event),
        }
    }

    fn bump_generation(&mut self) -> u64 {
        self.context.generation += 1;
        self.context.generation
    }

    fn discard(&mut self, event: Event) -> Vec<Effect> {
        tracing::debug!(state = ?self.state, event = event.label(), "discarding event with no transition");
        Vec::new()
    }

    fn update_form(&mut self, field: FormField, value: String) {
        match field {
            FormField::Value => self.context.form.value = value,
            // Numeric fields keep their previous (valid) value when the
            // input does not parse.
            FormField::Lifetime => {
                if let Ok(ms) = value.trim().parse() {
                    self.context.form.lifetime_ms = ms;
                }
            }
            FormField::Ttl => {
                if let Ok(ms) = value.trim().parse() {
                    self.context.form.ttl_ms = ms;
                }
            }
        }
    }

    fn handle_init(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::ClientReady { generation, result } if generation == self.context.generation => {
                match result {
                    Ok(client) => self.context.client = Some(client),
                    // Degraded mode: the UI stays usable, network
                    // operations fail individually.
                    Err(error) => self.context.error = Some(error.into()),
                }
                self.state = State::Inspect;
                Vec::new()
            }
            other => self.discard(other),
        }
    }

    fn handle_inspect(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::InspectName => {
                let Some(client) = self.context.client.clone() else {
                    self.context.error = Some(SessionError::Precondition(
                        "the name system client is not available",
                    ));
                    return Vec::new();
                };
                self.context.error = None;
                self.context.publish_success = false;
                self.context.fetching_record = true;
                self.state = State::VerifyAndFetch;
                let generation = self.bump_generation();
                vec![Effect::Fetch {
                    generation,
                    name: self.context.name_input.trim().to_string(),
                    client,
                }]
            }
            Event::SetMode(Mode::Create) => {
                self.enter_create_mode();
                Vec::new()
            }
            Event::SetMode(Mode::Inspect) => Vec::new(),
            Event::ImportRecordFile { bytes, file_stem } => {
                self.context.record = None;
                self.context.name.clear();
                self.context.name_validation_error = false;
                self.context.publish_success = false;
                self.context.error = None;
                self.state = State::ImportingRecord;
                let generation = self.bump_generation();
                vec![Effect::DecodeRecordFile {
                    generation,
                    bytes,
                    file_stem,
                }]
            }
            Event::PublishRecord => self.start_republish(),
            other => self.discard(other),
        }
    }

    fn enter_create_mode(&mut self) {
        self.context.name_input.clear();
        self.context.name_validation_error = false;
        self.context.publish_success = false;
        // A record fetched under an unrelated name must not surface in the
        // creation view; keep it only when it belongs to the current key.
        let derived = name_from_keypair(self.context.keypair.as_ref());
        let owned_by_current_key =
            self.context.record.is_some() && !derived.is_empty() && self.context.name == derived;
        if !owned_by_current_key {
            self.context.record = None;
            self.context.name.clear();
        }
        self.state = State::Create;
    }

    fn start_republish(&mut self) -> Vec<Effect> {
        self.context.publish_success = false;
        let (record, client) = match (&self.context.record, &self.context.client) {
            (Some(record), Some(client)) if !self.context.name.is_empty() => {
                (record.clone(), client.clone())
            }
            _ => {
                self.context.error = Some(SessionError::Precondition(
                    "nothing to republish: fetch or import a record first",
                ));
                return Vec::new();
            }
        };
        self.context.error = None;
        self.context.publishing_record = true;
        self.state = State::RepublishingRecord;
        let generation = self.bump_generation();
        vec![Effect::Republish {
            generation,
            name: self.context.name.clone(),
            record,
            client,
        }]
    }

    fn handle_fetch(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::FetchCompleted {
                generation,
                name,
                result,
            } if generation == self.context.generation => {
                self.context.fetching_record = false;
                match result {
                    Ok(record) => {
                        self.context.name = name;
                        self.context.record = Some(record);
                        self.context.error = None;
                    }
                    Err(error) => self.context.error = Some(error),
                }
                self.state = State::Inspect;
                Vec::new()
            }
            other => self.discard(other),
        }
    }

    fn handle_create(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::CreateRecord => self.start_record_build(false),
            Event::PublishRecord => self.start_record_build(true),
            Event::SetMode(Mode::Inspect) => {
                self.state = State::Inspect;
                Vec::new()
            }
            Event::SetMode(Mode::Create) => Vec::new(),
            Event::GenerateNewKey => {
                // The displayed record was signed by the key being
                // replaced, so it goes too.
                self.context.keypair = None;
                self.context.record = None;
                self.context.name.clear();
                self.context.publish_success = false;
                self.context.error = None;
                self.state = State::GeneratingKey;
                let generation = self.bump_generation();
                vec![Effect::GenerateKey { generation }]
            }
            Event::ImportPrivateKey => {
                let trimmed = self.context.private_key_input.trim().to_string();
                if trimmed.is_empty() {
                    // Local validation; no task is launched.
                    self.context.private_key_error =
                        Some("enter a private key to import".to_string());
                    return Vec::new();
                }
                self.context.private_key_error = None;
                self.state = State::ImportingPrivateKey;
                let generation = self.bump_generation();
                vec![Effect::ImportKey {
                    generation,
                    encoded: trimmed,
                }]
            }
            other => self.discard(other),
        }
    }

    fn start_record_build(&mut self, publish: bool) -> Vec<Effect> {
        self.context.publish_success = false;
        let (keypair, client) = match (&self.context.keypair, &self.context.client) {
            (Some(keypair), Some(client)) => (keypair.clone(), client.clone()),
            (None, _) => {
                self.context.error = Some(SessionError::Precondition(
                    "generate or import a key before creating a record",
                ));
                return Vec::new();
            }
            (_, None) => {
                self.context.error = Some(SessionError::Precondition(
                    "the name system client is not available",
                ));
                return Vec::new();
            }
        };
        self.context.error = None;
        if publish {
            self.context.publishing_record = true;
            self.state = State::PublishingRecord;
        } else {
            self.state = State::CreatingRecord;
        }
        let generation = self.bump_generation();
        vec![Effect::BuildRecord {
            generation,
            publish,
            keypair,
            form: self.context.form.clone(),
            client,
        }]
    }

    fn handle_generating_key(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::KeyGenerated { generation, result }
                if generation == self.context.generation =>
            {
                match result {
                    Ok(keypair) => {
                        self.context.keypair = Some(keypair);
                        self.context.error = None;
                    }
                    Err(error) => self.context.error = Some(error.into()),
                }
                self.state = State::Create;
                Vec::new()
            }
            other => self.discard(other),
        }
    }

    fn handle_record_built(&mut self, event: Event) -> Vec<Effect> {
        let expected_publish = self.state == State::PublishingRecord;
        match event {
            Event::RecordBuilt {
                generation,
                published,
                result,
            } if generation == self.context.generation && published == expected_publish => {
                self.context.publishing_record = false;
                match result {
                    Ok(record) => {
                        // The record's encoding does not carry the name;
                        // derive it from the authoring key.
                        self.context.name = name_from_keypair(self.context.keypair.as_ref());
                        self.context.record = Some(record);
                        self.context.error = None;
                        self.context.publish_success = expected_publish;
                    }
                    Err(error) => {
                        self.context.error = Some(error);
                        self.context.publish_success = false;
                        if !expected_publish {
                            // Keeping the old record would misrepresent the
                            // parameters that just failed.
                            self.context.record = None;
                            self.context.name.clear();
                        }
                    }
                }
                self.state = State::Create;
                Vec::new()
            }
            other => self.discard(other),
        }
    }

    fn handle_republish(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::RepublishCompleted { generation, result }
                if generation == self.context.generation =>
            {
                self.context.publishing_record = false;
                match result {
                    Ok(()) => {
                        self.context.publish_success = true;
                        self.context.error = None;
                    }
                    Err(error) => {
                        self.context.error = Some(error);
                        self.context.publish_success = false;
                    }
                }
                self.state = State::Inspect;
                Vec::new()
            }
            other => self.discard(other),
        }
    }

    fn handle_importing_record(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::RecordImported { generation, result }
                if generation == self.context.generation =>
            {
                match result {
                    Ok((record, name)) => {
                        self.context.record = Some(record);
                        self.context.name = name;
                        self.context.error = None;
                    }
                    Err(error) => {
                        self.context.record = None;
                        self.context.error = Some(error);
                    }
                }
                self.state = State::Inspect;
                Vec::new()
            }
            other => self.discard(other),
        }
    }

    fn handle_importing_key(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::KeyImported { generation, result }
                if generation == self.context.generation =>
            {
                match result {
                    Ok(keypair) => {
                        self.context.keypair = Some(keypair);
                        self.context.private_key_input.clear();
                        self.context.private_key_error = None;
                        self.context.import_dialog_open = false;
                    }
                    Err(_) => {
                        // Input is preserved and the dialog stays open so
                        // the user can correct it.
                        self.context.private_key_error =
                            Some("the private key could not be imported".to_string());
                    }
                }
                self.state = State::Create;
                Vec::new()
            }
            other => self.discard(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryNameSystem;

    fn test_connector() -> Connector {
        Box::pin(InMemoryNameSystem::connect())
    }

    fn ready_machine() -> Machine {
        let (mut machine, effects) = Machine::new(test_connector());
        assert!(matches!(effects.as_slice(), [Effect::InitClient { .. }]));
        let generation = machine.context().generation;
        machine.handle(Event::ClientReady {
            generation,
            result: Ok(InMemoryNameSystem::new()),
        });
        assert_eq!(machine.state(), State::Inspect);
        machine
    }

    fn machine_with_keypair() -> (Machine, Keypair) {
        let mut machine = ready_machine();
        machine.handle(Event::SetMode(Mode::Create));
        let keypair = Keypair::generate().unwrap();
        machine.context.keypair = Some(keypair.clone());
        (machine, keypair)
    }

    #[test]
    fn init_failure_degrades_into_inspect() {
        let (mut machine, _) = Machine::new(test_connector());
        let generation = machine.context().generation;
        machine.handle(Event::ClientReady {
            generation,
            result: Err(ClientError::Network("bootstrap failed".to_string())),
        });
        assert_eq!(machine.state(), State::Inspect);
        assert!(machine.context().client.is_none());
        assert!(machine.context().error.as_ref().unwrap().is_network());

        // Network operations now fail individually with a local error.
        let effects = machine.handle(Event::InspectName);
        assert!(effects.is_empty());
        assert!(machine.context().error.as_ref().unwrap().is_precondition());
        assert_eq!(machine.state(), State::Inspect);
    }

    #[test]
    fn name_validation_runs_on_demand_only() {
        let mut machine = ready_machine();

        machine.handle(Event::UpdateName {
            value: "not-a-valid-name".to_string(),
            validate: false,
        });
        assert!(!machine.context().name_validation_error);

        machine.handle(Event::UpdateName {
            value: "not-a-valid-name".to_string(),
            validate: true,
        });
        assert!(machine.context().name_validation_error);

        let keypair = Keypair::generate().unwrap();
        machine.handle(Event::UpdateName {
            value: name_from_keypair(Some(&keypair)),
            validate: true,
        });
        assert!(!machine.context().name_validation_error);
    }

    #[test]
    fn form_updates_parse_numeric_fields() {
        let mut machine = ready_machine();
        machine.handle(Event::UpdateForm {
            field: FormField::Lifetime,
            value: "86400000".to_string(),
        });
        assert_eq!(machine.context().form.lifetime_ms, 86_400_000);

        machine.handle(Event::UpdateForm {
            field: FormField::Lifetime,
            value: "not-a-number".to_string(),
        });
        assert_eq!(machine.context().form.lifetime_ms, 86_400_000);

        machine.handle(Event::UpdateForm {
            field: FormField::Value,
            value: "/some/path".to_string(),
        });
        assert_eq!(machine.context().form.value, "/some/path");
    }

    #[test]
    fn republish_without_a_record_never_launches_a_task() {
        let mut machine = ready_machine();
        let effects = machine.handle(Event::PublishRecord);
        assert!(effects.is_empty());
        assert_eq!(machine.state(), State::Inspect);
        assert!(machine.context().error.as_ref().unwrap().is_precondition());
    }

    #[test]
    fn create_without_a_keypair_never_launches_a_task() {
        let mut machine = ready_machine();
        machine.handle(Event::SetMode(Mode::Create));
        let effects = machine.handle(Event::CreateRecord);
        assert!(effects.is_empty());
        assert_eq!(machine.state(), State::Create);
        assert!(machine.context().error.as_ref().unwrap().is_precondition());
    }

    #[test]
    fn blank_private_key_input_is_a_local_error() {
        let (mut machine, _) = machine_with_keypair();
        machine.handle(Event::UpdatePrivateKeyInput {
            value: "   ".to_string(),
        });
        let effects = machine.handle(Event::ImportPrivateKey);
        assert!(effects.is_empty());
        assert_eq!(machine.state(), State::Create);
        assert!(machine.context().private_key_error.is_some());
    }

    #[test]
    fn closing_the_import_dialog_clears_its_transient_state() {
        let mut machine = ready_machine();
        machine.handle(Event::OpenImportDialog);
        machine.handle(Event::UpdatePrivateKeyInput {
            value: "abc".to_string(),
        });
        machine.handle(Event::CloseImportDialog);
        assert!(!machine.context().import_dialog_open);
        assert!(machine.context().private_key_input.is_empty());
        assert!(machine.context().private_key_error.is_none());
    }

    #[test]
    fn stale_completions_are_discarded() {
        let mut machine = ready_machine();
        machine.handle(Event::UpdateName {
            value: "k51whatever".to_string(),
            validate: false,
        });
        let effects = machine.handle(Event::InspectName);
        assert!(matches!(effects.as_slice(), [Effect::Fetch { .. }]));
        assert_eq!(machine.state(), State::VerifyAndFetch);
        let current = machine.context().generation;

        // A completion from an older generation must not apply.
        let keypair = Keypair::generate().unwrap();
        let stale = Record::build(&keypair, "/stale", 1000, 1000, 1, false);
        machine.handle(Event::FetchCompleted {
            generation: current - 1,
            name: "k51whatever".to_string(),
            result: Ok(stale),
        });
        assert_eq!(machine.state(), State::VerifyAndFetch);
        assert!(machine.context().record.is_none());
        assert!(machine.context().fetching_record);

        // The matching completion still lands afterwards.
        let fresh = Record::build(&keypair, "/fresh", 1000, 1000, 1, false);
        machine.handle(Event::FetchCompleted {
            generation: current,
            name: "k51whatever".to_string(),
            result: Ok(fresh),
        });
        assert_eq!(machine.state(), State::Inspect);
        assert_eq!(machine.context().record.as_ref().unwrap().value, "/fresh");
        assert!(!machine.context().fetching_record);
    }

    #[test]
    fn completion_for_the_wrong_slot_is_discarded() {
        let (mut machine, keypair) = machine_with_keypair();
        let effects = machine.handle(Event::CreateRecord);
        assert!(matches!(
            effects.as_slice(),
            [Effect::BuildRecord { publish: false, .. }]
        ));
        let generation = machine.context().generation;

        // Same generation but flagged as a publish completion: the offline
        // construction slot must not accept it.
        let record = Record::build(&keypair, "/x", 1000, 1000, 1, false);
        machine.handle(Event::RecordBuilt {
            generation,
            published: true,
            result: Ok(record.clone()),
        });
        assert_eq!(machine.state(), State::CreatingRecord);
        assert!(machine.context().record.is_none());

        machine.handle(Event::RecordBuilt {
            generation,
            published: false,
            result: Ok(record),
        });
        assert_eq!(machine.state(), State::Create);
        assert!(machine.context().record.is_some());
        assert_eq!(machine.context().name, name_from_keypair(Some(&keypair)));
    }

    #[test]
    fn generating_a_key_invalidates_the_displayed_record() {
        let (mut machine, keypair) = machine_with_keypair();
        machine.context.record = Some(Record::build(&keypair, "/x", 1000, 1000, 1, false));
        machine.context.name = name_from_keypair(Some(&keypair));

        let effects = machine.handle(Event::GenerateNewKey);
        assert!(matches!(effects.as_slice(), [Effect::GenerateKey { .. }]));
        assert_eq!(machine.state(), State::GeneratingKey);
        assert!(machine.context().keypair.is_none());
        assert!(machine.context().record.is_none());
        assert!(machine.context().name.is_empty());

        let generation = machine.context().generation;
        let fresh = Keypair::generate().unwrap();
        machine.handle(Event::KeyGenerated {
            generation,
            result: Ok(fresh),
        });
        assert_eq!(machine.state(), State::Create);
        assert!(machine.context().keypair.is_some());
        assert!(machine.context().record.is_none());
    }

    #[test]
    fn failed_record_build_clears_the_record() {
        let (mut machine, _) = machine_with_keypair();
        machine.handle(Event::CreateRecord);
        let generation = machine.context().generation;
        machine.handle(Event::RecordBuilt {
            generation,
            published: false,
            result: Err(SessionError::Client(ClientError::Signing(
                "corrupt key".to_string(),
            ))),
        });
        assert_eq!(machine.state(), State::Create);
        assert!(machine.context().record.is_none());
        assert!(machine.context().error.is_some());
    }

    #[test]
    fn switching_to_create_keeps_only_the_current_keys_record() {
        // A record fetched under a foreign name is dropped.
        let (mut machine, keypair) = machine_with_keypair();
        machine.handle(Event::SetMode(Mode::Inspect));
        let other = Keypair::generate().unwrap();
        machine.context.record = Some(Record::build(&other, "/x", 1000, 1000, 1, false));
        machine.context.name = name_from_keypair(Some(&other));
        machine.handle(Event::SetMode(Mode::Create));
        assert!(machine.context().record.is_none());
        assert!(machine.context().name.is_empty());

        // A record owned by the current keypair survives the switch.
        machine.handle(Event::SetMode(Mode::Inspect));
        machine.context.record = Some(Record::build(&keypair, "/x", 1000, 1000, 1, false));
        machine.context.name = name_from_keypair(Some(&keypair));
        machine.handle(Event::SetMode(Mode::Create));
        assert!(machine.context().record.is_some());
        assert_eq!(machine.context().name, name_from_keypair(Some(&keypair)));
    }

    #[test]
    fn fetched_record_keeps_the_name_it_was_resolved_under() {
        let mut machine = ready_machine();
        let keypair = Keypair::generate().unwrap();
        let launched = name_from_keypair(Some(&keypair));
        machine.handle(Event::UpdateName {
            value: launched.clone(),
            validate: false,
        });
        let effects = machine.handle(Event::InspectName);
        assert!(matches!(effects.as_slice(), [Effect::Fetch { .. }]));
        let generation = machine.context().generation;

        // The input keeps being edited while the resolution is in flight.
        machine.handle(Event::UpdateName {
            value: "something-else-entirely".to_string(),
            validate: false,
        });

        let record = Record::build(&keypair, "/fetched", 1000, 1000, 1, false);
        machine.handle(Event::FetchCompleted {
            generation,
            name: launched.clone(),
            result: Ok(record),
        });
        assert_eq!(machine.state(), State::Inspect);
        assert_eq!(machine.context().name, launched);
        assert_eq!(machine.context().name_input, "something-else-entirely");
    }

    #[test]
    fn fetch_attempt_clears_the_previous_error_and_notice() {
        let mut machine = ready_machine();
        machine.context.error = Some(SessionError::Client(ClientError::NotFound));
        machine.context.publish_success = true;
        machine.handle(Event::InspectName);
        assert!(machine.context().error.is_none());
        assert!(!machine.context().publish_success);
        assert!(machine.context().fetching_record);
    }
}
