use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use snafu::{OptionExt, ResultExt, Snafu};

use loqui_core::{
    ConversationExecutor, ConversationId, CoreError, ExecutionMode, ImagineService, Message,
    MessageId, Role, SelectionTracker, ServiceResult, project, truncate_at,
};
use loqui_session::{MessageListSession, PREFERENCES_FILE_NAME, PreferencesStore};
use loqui_storage::TsvConversationStore;

#[derive(Debug, Clone)]
struct RunnerArgs {
    scenario: Scenario,
    root: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Scenario {
    ProjectionFiltering,
    TruncationBounds,
    SelectionBulk,
    StoreRoundtrip,
    ConversationSwitch,
    SessionReplay,
    All,
}

impl Scenario {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "projection_filtering" => Some(Self::ProjectionFiltering),
            "truncation_bounds" => Some(Self::TruncationBounds),
            "selection_bulk" => Some(Self::SelectionBulk),
            "store_roundtrip" => Some(Self::StoreRoundtrip),
            "conversation_switch" => Some(Self::ConversationSwitch),
            "session_replay" => Some(Self::SessionReplay),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::ProjectionFiltering => "projection_filtering",
            Self::TruncationBounds => "truncation_bounds",
            Self::SelectionBulk => "selection_bulk",
            Self::StoreRoundtrip => "store_roundtrip",
            Self::ConversationSwitch => "conversation_switch",
            Self::SessionReplay => "session_replay",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Snafu)]
enum RunnerError {
    #[snafu(display("missing required --scenario argument"))]
    MissingScenario { stage: &'static str },
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue {
        stage: &'static str,
        arg: &'static str,
    },
    #[snafu(display("unknown scenario '{raw}'"))]
    UnknownScenario { stage: &'static str, raw: String },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("missing required --root argument for scenario '{scenario}'"))]
    MissingRoot {
        stage: &'static str,
        scenario: &'static str,
    },
    #[snafu(display("core operation failed: {source}"))]
    CoreValidation {
        stage: &'static str,
        source: CoreError,
    },
    #[snafu(display("storage operation failed: {source}"))]
    StorageValidation {
        stage: &'static str,
        source: loqui_storage::StorageError,
    },
    #[snafu(display("scenario '{scenario}' failed: {reason}"))]
    ScenarioFailed {
        stage: &'static str,
        scenario: &'static str,
        reason: String,
    },
}

type RunnerResult<T> = Result<T, RunnerError>;

fn main() {
    tracing_subscriber::fmt::init();

    if let Err(error) = run() {
        println!("runner_ok=false");
        eprintln!("runner_error={error}");
        std::process::exit(1);
    }
}

fn run() -> RunnerResult<()> {
    let args = parse_args(env::args().skip(1))?;
    println!("scenario={}", args.scenario.name());
    if let Some(root) = args.root.as_deref() {
        println!("root={root}");
    }

    match args.scenario {
        Scenario::ProjectionFiltering => run_projection_filtering(),
        Scenario::TruncationBounds => run_truncation_bounds(),
        Scenario::SelectionBulk => run_selection_bulk(),
        Scenario::StoreRoundtrip => {
            run_store_roundtrip(require_root(&args, "store_roundtrip")?)
        }
        Scenario::ConversationSwitch => {
            run_conversation_switch(require_root(&args, "conversation_switch")?)
        }
        Scenario::SessionReplay => run_session_replay(require_root(&args, "session_replay")?),
        Scenario::All => run_all(args.root.as_deref()),
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> RunnerResult<RunnerArgs> {
    let mut scenario = None;
    let mut root = None;
    let mut pending = args.into_iter();

    while let Some(argument) = pending.next() {
        match argument.as_str() {
            "--scenario" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-scenario-value",
                    arg: "--scenario",
                })?;

                let parsed = Scenario::parse(&value).context(UnknownScenarioSnafu {
                    stage: "parse-args-scenario",
                    raw: value,
                })?;
                scenario = Some(parsed);
            }
            "--root" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-root-value",
                    arg: "--root",
                })?;
                root = Some(value);
            }
            _ => {
                return UnknownArgumentSnafu {
                    stage: "parse-args",
                    raw: argument,
                }
                .fail();
            }
        }
    }

    Ok(RunnerArgs {
        scenario: scenario.context(MissingScenarioSnafu {
            stage: "parse-args-scenario-required",
        })?,
        root,
    })
}

fn run_all(root: Option<&str>) -> RunnerResult<()> {
    run_projection_filtering()?;
    run_truncation_bounds()?;
    run_selection_bulk()?;

    if let Some(root) = root {
        run_store_roundtrip(root)?;
        run_conversation_switch(root)?;
        run_session_replay(root)?;
    }

    println!("all_passed=true");
    Ok(())
}

fn mixed_history() -> Vec<Message> {
    vec![
        Message::synthesized(Role::User, "m1"),
        Message::synthesized(Role::System, "m2"),
        Message::synthesized(Role::Assistant, "m3"),
    ]
}

fn run_projection_filtering() -> RunnerResult<()> {
    let canonical = mixed_history();

    let hidden = project(&canonical, false);
    let shown = project(&canonical, true);
    let hidden_contents = hidden
        .iter()
        .map(|message| message.content.as_str())
        .collect::<Vec<_>>();

    let filtering_ok = hidden_contents == vec!["m3", "m1"] && shown.len() == canonical.len();
    let deterministic = project(&canonical, false) == hidden;
    let empty_ok = project(&[], false).is_empty();

    println!("filtering_ok={filtering_ok}");
    println!("deterministic={deterministic}");
    println!("empty_ok={empty_ok}");

    if !(filtering_ok && deterministic && empty_ok) {
        return ScenarioFailedSnafu {
            stage: "scenario-projection-filtering-assert",
            scenario: "projection_filtering",
            reason: "display sequence derivation violated filtering or ordering".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

fn run_truncation_bounds() -> RunnerResult<()> {
    let canonical = mixed_history();

    let exact = truncate_at(&canonical, canonical[1].id, 0)
        .context(CoreValidationSnafu { stage: "scenario-truncation-bounds-exact" })?;
    let with_reply = truncate_at(&canonical, canonical[0].id, 1)
        .context(CoreValidationSnafu { stage: "scenario-truncation-bounds-with-reply" })?;
    let overflow = truncate_at(&canonical, canonical[2].id, 100)
        .context(CoreValidationSnafu { stage: "scenario-truncation-bounds-overflow" })?;
    let underflow = truncate_at(&canonical, canonical[0].id, -100)
        .context(CoreValidationSnafu { stage: "scenario-truncation-bounds-underflow" })?;
    let unknown_rejected = matches!(
        truncate_at(&canonical, MessageId::mint(), 0),
        Err(CoreError::TruncateTargetMissing { .. })
    );

    let bounds_ok = exact == canonical[..=1].to_vec()
        && with_reply == canonical[..=1].to_vec()
        && overflow == canonical
        && underflow.is_empty();

    println!("bounds_ok={bounds_ok}");
    println!("unknown_rejected={unknown_rejected}");

    if !(bounds_ok && unknown_rejected) {
        return ScenarioFailedSnafu {
            stage: "scenario-truncation-bounds-assert",
            scenario: "truncation_bounds",
            reason: "truncation prefix or clamping policy mismatch".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

fn run_selection_bulk() -> RunnerResult<()> {
    let canonical = mixed_history();
    let mut tracker = SelectionTracker::new();
    tracker.set_active(true);
    tracker.sync_conversation(Some(ConversationId::mint()));

    tracker.select_all(canonical.iter().map(|message| message.id));
    let select_all_ok = tracker.len() == canonical.len();

    let consumed = tracker.take_selected();
    let consume_ok = consumed.len() == canonical.len() && tracker.is_empty();

    let toggled = canonical[0].id;
    tracker.toggle(toggled, true);
    tracker.toggle(toggled, true);
    let idempotent_ok = tracker.len() == 1;
    tracker.toggle(MessageId::mint(), false);
    let absent_noop_ok = tracker.len() == 1;

    println!("select_all_ok={select_all_ok}");
    println!("consume_ok={consume_ok}");
    println!("idempotent_ok={idempotent_ok}");
    println!("absent_noop_ok={absent_noop_ok}");

    if !(select_all_ok && consume_ok && idempotent_ok && absent_noop_ok) {
        return ScenarioFailedSnafu {
            stage: "scenario-selection-bulk-assert",
            scenario: "selection_bulk",
            reason: "selection tracker bulk semantics mismatch".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

fn run_store_roundtrip(root: &str) -> RunnerResult<()> {
    let store = TsvConversationStore::new(scenario_dir(root, "store-roundtrip"));

    let conversation =
        store
            .create_conversation("roundtrip")
            .context(StorageValidationSnafu { stage: "scenario-store-roundtrip-create" })?;
    store
        .append_message(conversation.id, Role::User, "tab\there\nand newline")
        .context(StorageValidationSnafu { stage: "scenario-store-roundtrip-append" })?;

    let reopened = TsvConversationStore::new(store.root().to_path_buf());
    let loaded = reopened
        .load_conversation(conversation.id)
        .context(StorageValidationSnafu { stage: "scenario-store-roundtrip-load" })?;

    let roundtrip_ok = loaded
        .as_ref()
        .is_some_and(|conversation| {
            conversation.messages.len() == 1
                && conversation.messages[0].content == "tab\there\nand newline"
                && conversation.token_count > 0
        });

    println!("roundtrip_ok={roundtrip_ok}");
    if !roundtrip_ok {
        return ScenarioFailedSnafu {
            stage: "scenario-store-roundtrip-assert",
            scenario: "store_roundtrip",
            reason: "escaped content or token count did not survive reopen".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

fn run_conversation_switch(root: &str) -> RunnerResult<()> {
    let (mut session, store, _executor) = wired_session(root, "conversation-switch")?;

    let conversation_a =
        store
            .create_conversation("switch-a")
            .context(StorageValidationSnafu { stage: "scenario-conversation-switch-create-a" })?;
    let conversation_b =
        store
            .create_conversation("switch-b")
            .context(StorageValidationSnafu { stage: "scenario-conversation-switch-create-b" })?;
    store
        .append_message(conversation_a.id, Role::User, "first")
        .context(StorageValidationSnafu { stage: "scenario-conversation-switch-append" })?;

    session.activate_conversation(Some(conversation_a.id));
    session.set_selection_mode(true);
    session.select_all();
    let selected_before = session.selection().len();

    session.activate_conversation(Some(conversation_b.id));
    let cleared_on_switch = session.selection().is_empty();

    println!("selected_before={selected_before}");
    println!("cleared_on_switch={cleared_on_switch}");

    if selected_before != 1 || !cleared_on_switch {
        return ScenarioFailedSnafu {
            stage: "scenario-conversation-switch-assert",
            scenario: "conversation_switch",
            reason: "selection did not clear on conversation identifier change".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

fn run_session_replay(root: &str) -> RunnerResult<()> {
    let (mut session, store, executor) = wired_session(root, "session-replay")?;

    let conversation =
        store
            .create_conversation("replay")
            .context(StorageValidationSnafu { stage: "scenario-session-replay-create" })?;
    let prompt = store
        .append_message(conversation.id, Role::User, "prompt")
        .context(StorageValidationSnafu { stage: "scenario-session-replay-append-prompt" })?;
    store
        .append_message(conversation.id, Role::Assistant, "reply")
        .context(StorageValidationSnafu { stage: "scenario-session-replay-append-reply" })?;
    store
        .append_message(conversation.id, Role::User, "follow-up")
        .context(StorageValidationSnafu { stage: "scenario-session-replay-append-follow-up" })?;

    session.activate_conversation(Some(conversation.id));
    session
        .restart_from_message(prompt.id, 1)
        .context(CoreValidationSnafu { stage: "scenario-session-replay-restart" })?;
    session.run_example("one more example");

    let submissions = executor.submissions.lock().unwrap();
    let replay_ok = submissions.len() == 2
        && submissions[0].0 == ExecutionMode::Immediate
        && submissions[0].2.len() == 2
        && submissions[0].2[0].id == prompt.id;
    let example_ok = submissions[1].2.len() == 4
        && submissions[1]
            .2
            .last()
            .is_some_and(|message| message.content == "one more example");

    println!("replay_ok={replay_ok}");
    println!("example_ok={example_ok}");

    if !(replay_ok && example_ok) {
        return ScenarioFailedSnafu {
            stage: "scenario-session-replay-assert",
            scenario: "session_replay",
            reason: "submitted histories did not match truncation/append expectations"
                .to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

#[derive(Default)]
struct RecordingExecutor {
    submissions: Mutex<Vec<(ExecutionMode, ConversationId, Vec<Message>)>>,
}

impl ConversationExecutor for RecordingExecutor {
    fn execute_conversation(
        &self,
        mode: ExecutionMode,
        conversation_id: ConversationId,
        history: Vec<Message>,
    ) -> ServiceResult<()> {
        self.submissions
            .lock()
            .unwrap()
            .push((mode, conversation_id, history));
        Ok(())
    }
}

struct NoopImagine;

impl ImagineService for NoopImagine {
    fn imagine_from_text(&self, _: ConversationId, _: &str) -> ServiceResult<()> {
        Ok(())
    }
}

fn wired_session(
    root: &str,
    label: &str,
) -> RunnerResult<(MessageListSession, Arc<TsvConversationStore>, Arc<RecordingExecutor>)> {
    let scenario_root = scenario_dir(root, label);
    let store = Arc::new(TsvConversationStore::new(scenario_root.clone()));
    let executor = Arc::new(RecordingExecutor::default());
    let preferences = Arc::new(PreferencesStore::new(
        scenario_root.join(PREFERENCES_FILE_NAME),
    ));

    let session = MessageListSession::new(
        store.clone(),
        executor.clone(),
        Arc::new(NoopImagine),
        preferences,
    );
    Ok((session, store, executor))
}

fn scenario_dir(root: &str, label: &str) -> PathBuf {
    PathBuf::from(root).join(format!("{label}-{}", ConversationId::mint()))
}

fn require_root<'args>(args: &'args RunnerArgs, scenario: &'static str) -> RunnerResult<&'args str> {
    args.root.as_deref().context(MissingRootSnafu {
        stage: "require-root",
        scenario,
    })
}
