//! The daemon's boot-time context.
//!
//! One `HostState` owns every registry as an explicit field — collections,
//! providers, connections, counters — and is built during a deterministic
//! boot phase. Anything that needs them receives the context; there are no
//! hidden globals.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use tokio::sync::{Mutex, mpsc, oneshot};

use corral_infra::config::Configuration;
use corral_infra::events::EventBus;
use corral_infra::sessions::SessionStore;
use corral_infra::store::Collection;
use corral_infra::tools::ToolRegistry;
use corral_shared::protocol::{BridgeMessage, CommandResponseMsg};
use corral_shared::schemas::approval::{ApprovalRecord, QuestionRecord};
use corral_shared::schemas::group::GroupRecord;
use corral_shared::schemas::template::TemplateRecord;

use crate::providers::ProviderRegistry;

pub struct HostState {
    pub config: Configuration,
    pub events: EventBus,
    pub sessions: Mutex<SessionStore>,
    pub templates: Mutex<Collection<TemplateRecord>>,
    pub groups: Mutex<Collection<GroupRecord>>,
    pub approvals: Mutex<Collection<ApprovalRecord>>,
    pub questions: Mutex<Collection<QuestionRecord>>,
    pub providers: ProviderRegistry,
    /// Outbound pump per connected session child.
    pub connections: Mutex<HashMap<u64, mpsc::UnboundedSender<BridgeMessage>>>,
    /// Sessions whose socket listener is already up.
    pub listeners: Mutex<HashSet<u64>>,
    /// Host→child round-trips parked by string message id.
    pub pending: std::sync::Mutex<HashMap<String, oneshot::Sender<CommandResponseMsg>>>,
    /// Live children by session id.
    pub children: Mutex<HashMap<u64, u32>>,
    approval_seq: AtomicU64,
    question_seq: AtomicU64,
    /// Back-reference set once the registry is built, so handlers bound
    /// against the state can reach the full context.
    core: OnceLock<Core>,
}

impl HostState {
    pub fn new(config: Configuration) -> Result<Self> {
        let events = EventBus::new();
        let sessions = SessionStore::with_events(&config.sessions_dir, events.clone());
        let mut templates = Collection::with_extension(&config.templates_dir, "yaml");
        // read-only at runtime: warm the cache once
        templates.load_all();

        let approvals: Collection<ApprovalRecord> = Collection::new(&config.approvals_dir);
        let questions: Collection<QuestionRecord> = Collection::new(&config.questions_dir);
        let approval_seq = next_seq(&approvals);
        let question_seq = next_seq(&questions);

        Ok(Self {
            groups: Mutex::new(Collection::new(&config.groups_dir)),
            events,
            sessions: Mutex::new(sessions),
            templates: Mutex::new(templates),
            approvals: Mutex::new(approvals),
            questions: Mutex::new(questions),
            providers: ProviderRegistry::new(),
            connections: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashSet::new()),
            pending: std::sync::Mutex::new(HashMap::new()),
            children: Mutex::new(HashMap::new()),
            approval_seq: AtomicU64::new(approval_seq),
            question_seq: AtomicU64::new(question_seq),
            core: OnceLock::new(),
            config,
        })
    }

    pub fn next_approval_id(&self) -> u64 {
        self.approval_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_question_id(&self) -> u64 {
        self.question_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn set_core(&self, core: Core) {
        let _ = self.core.set(core);
    }

    /// The full context; available to handlers after boot completes.
    pub fn core(&self) -> Core {
        self.core.get().expect("core is set during boot").clone()
    }
}

fn next_seq<T: serde::Serialize + serde::de::DeserializeOwned + Clone>(
    col: &Collection<T>,
) -> u64 {
    col.list()
        .iter()
        .filter_map(|id| id.parse::<u64>().ok())
        .max()
        .map_or(1, |max| max + 1)
}

/// The daemon context handed around after boot.
#[derive(Clone)]
pub struct Core {
    pub state: Arc<HostState>,
    pub registry: Arc<ToolRegistry>,
}

/// Deterministic boot: state first, then the registry bound against it, then
/// the back-reference.
pub fn boot(config: Configuration) -> Result<Core> {
    let state = Arc::new(HostState::new(config)?);
    let registry = crate::tools::build_registry(state.clone());
    let core = Core {
        state: state.clone(),
        registry: Arc::new(registry),
    };
    state.set_core(core.clone());
    Ok(core)
}
