//! End-to-end processor behavior: session lifecycle, option accumulation,
//! completion hooks, and the event stream.

use async_trait::async_trait;
use callflow::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Subscriber that records every event for later assertions.
#[derive(Default)]
struct Capture {
    events: Mutex<Vec<CallEvent>>,
}

#[async_trait]
impl CallEventHandler for Capture {
    async fn on_event(&self, event: CallEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl Capture {
    fn snapshot(&self) -> Vec<CallEvent> {
        self.events.lock().unwrap().clone()
    }
}

async fn drain() {
    // Event delivery is off the processing path; give the forwarding
    // tasks a moment before asserting on the captured stream.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn ivr(completions: Arc<AtomicUsize>) -> Arc<StateMachine> {
    MachineBuilder::new("ivr", "greeting")
        .state("greeting", |_, _| {
            Ok(vec![Directive::gather(
                1,
                5,
                vec![Directive::say("Press 1 for English")],
            )])
        })
        .state("english", |_, _| Ok(vec![Directive::say("Hello!")]))
        .rule(
            RulePattern::on("greeting").when_input("Digits", "1"),
            NextAction::goto("english"),
        )
        .rule(
            RulePattern::on("greeting"),
            NextAction::goto_with("greeting", options_from([("error", json!("invalid"))])),
        )
        .rule(RulePattern::on("english"), NextAction::goto("english"))
        .on_complete(move |_state, _input, _options| {
            completions.fetch_add(1, Ordering::SeqCst);
        })
        .build()
}

fn processor_with(machine: Arc<StateMachine>) -> CallProcessor {
    let registry = Arc::new(MachineRegistry::new());
    registry.register(machine);
    CallProcessor::new(registry, Arc::new(PlainTextRenderer))
}

fn in_progress(call_id: &str) -> CallInput {
    CallInput::new(call_id, CallStatus::InProgress)
}

#[tokio::test]
async fn first_request_shows_initial_state_and_ignores_digits() {
    let processor = processor_with(ivr(Arc::new(AtomicUsize::new(0))));

    let outcome = processor
        .process(
            &"ivr".into(),
            in_progress("CA1").with_field("Digits", "1"),
            Options::new(),
        )
        .await
        .unwrap();

    // No session existed, so digits do not drive a transition yet.
    assert_eq!(outcome.state.name, StateName::from("greeting"));
    assert!(!outcome.recovered);
    assert!(!outcome.completed);
    assert_eq!(processor.store().len(), 1);
}

#[tokio::test]
async fn second_request_transitions_on_digits() {
    let processor = processor_with(ivr(Arc::new(AtomicUsize::new(0))));
    let machine_id = MachineId::from("ivr");

    processor
        .process(&machine_id, in_progress("CA1"), Options::new())
        .await
        .unwrap();
    let outcome = processor
        .process(
            &machine_id,
            in_progress("CA1").with_field("Digits", "1"),
            Options::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.state.name, StateName::from("english"));
    let session = processor.store().get(&"CA1".into()).unwrap();
    assert_eq!(session.state_name, StateName::from("english"));
}

#[tokio::test]
async fn invalid_digits_loop_back_with_an_error_option() {
    let processor = processor_with(ivr(Arc::new(AtomicUsize::new(0))));
    let machine_id = MachineId::from("ivr");

    processor
        .process(&machine_id, in_progress("CA1"), Options::new())
        .await
        .unwrap();
    let outcome = processor
        .process(
            &machine_id,
            in_progress("CA1").with_field("Digits", "9"),
            Options::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.state.name, StateName::from("greeting"));
    // The option survives in the stored session for every later request.
    let session = processor.store().get(&"CA1".into()).unwrap();
    assert_eq!(session.options["error"], json!("invalid"));
}

#[tokio::test]
async fn caller_supplied_options_win_on_merge() {
    let observed: Arc<Mutex<Option<Options>>> = Arc::new(Mutex::new(None));
    let observed_in_resolver = observed.clone();
    let machine = MachineBuilder::new("merge", "start")
        .state("start", move |_, options| {
            *observed_in_resolver.lock().unwrap() = Some(options.clone());
            Ok(vec![Directive::say("start")])
        })
        .rule(RulePattern::on("start"), NextAction::goto("start"))
        .build();
    let processor = processor_with(machine);
    let machine_id = MachineId::from("merge");

    processor
        .process(
            &machine_id,
            in_progress("CA1"),
            options_from([("lang", json!("en")), ("tries", json!(1))]),
        )
        .await
        .unwrap();
    processor
        .process(
            &machine_id,
            in_progress("CA1"),
            options_from([("lang", json!("es"))]),
        )
        .await
        .unwrap();

    let merged = observed.lock().unwrap().clone().unwrap();
    assert_eq!(merged["lang"], json!("es"));
    assert_eq!(merged["tries"], json!(1));
}

#[tokio::test]
async fn missing_call_id_is_rejected_before_the_store() {
    let processor = processor_with(ivr(Arc::new(AtomicUsize::new(0))));

    let err = processor
        .process(&"ivr".into(), in_progress("  "), Options::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CallFlowError::InvalidInput(_)));
    assert_eq!(processor.store().len(), 0);
}

#[tokio::test]
async fn unknown_machine_is_an_error() {
    let processor = processor_with(ivr(Arc::new(AtomicUsize::new(0))));

    let err = processor
        .process(&"missing".into(), in_progress("CA1"), Options::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CallFlowError::UnknownMachine(_)));
}

#[tokio::test]
async fn completed_call_runs_hook_once_and_removes_the_session() {
    let completions = Arc::new(AtomicUsize::new(0));
    let processor = processor_with(ivr(completions.clone()));
    let machine_id = MachineId::from("ivr");
    let capture = Arc::new(Capture::default());
    processor.events().subscribe(capture.clone()).await;

    processor
        .process(&machine_id, in_progress("CA1"), Options::new())
        .await
        .unwrap();
    let outcome = processor
        .process(
            &machine_id,
            CallInput::new("CA1", CallStatus::Completed).with_field("Digits", "1"),
            Options::new(),
        )
        .await
        .unwrap();

    assert!(outcome.completed);
    assert_eq!(completions.load(Ordering::SeqCst), 1);
    assert!(processor.store().get(&"CA1".into()).is_none());

    drain().await;
    let completed_events = capture
        .snapshot()
        .iter()
        .filter(|e| matches!(e, CallEvent::CallCompleted { .. }))
        .count();
    assert_eq!(completed_events, 1);

    // Same id afterwards is a brand-new call.
    let outcome = processor
        .process(
            &machine_id,
            in_progress("CA1").with_field("Digits", "1"),
            Options::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.state.name, StateName::from("greeting"));
}

#[tokio::test]
async fn fatal_transition_leaves_the_session_at_its_last_good_state() {
    let machine = MachineBuilder::new("strict", "start")
        .state("start", |_, _| Ok(vec![Directive::say("start")]))
        .state("limbo", |_, _| Ok(vec![Directive::say("limbo")]))
        .rule(RulePattern::on("start"), NextAction::goto("limbo"))
        .build();
    let processor = processor_with(machine);
    let machine_id = MachineId::from("strict");

    processor
        .process(&machine_id, in_progress("CA1"), Options::new())
        .await
        .unwrap();
    processor
        .process(&machine_id, in_progress("CA1"), Options::new())
        .await
        .unwrap();

    // No rule covers "limbo": the transition is fatal and the stored
    // session must not move.
    let err = processor
        .process(&machine_id, in_progress("CA1"), Options::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CallFlowError::FatalTransition { .. }));

    let session = processor.store().get(&"CA1".into()).unwrap();
    assert_eq!(session.state_name, StateName::from("limbo"));

    // The session is still usable if the application later covers the
    // state; here it simply stays parked.
    let err = processor
        .process(&machine_id, in_progress("CA1"), Options::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CallFlowError::FatalTransition { .. }));
}

#[tokio::test]
async fn recovered_transition_is_flagged_and_published() {
    let machine = MachineBuilder::new("recovering", "start")
        .state("start", |_, _| Ok(vec![Directive::say("start")]))
        .state("apology", |_, _| Ok(vec![Directive::say("Sorry")]))
        .on_transition_error(|_, _, _, _| Ok(Recovery::to_state("apology", Options::new())))
        .build();
    let processor = processor_with(machine);
    let machine_id = MachineId::from("recovering");
    let capture = Arc::new(Capture::default());
    processor.events().subscribe(capture.clone()).await;

    processor
        .process(&machine_id, in_progress("CA1"), Options::new())
        .await
        .unwrap();
    let outcome = processor
        .process(&machine_id, in_progress("CA1"), Options::new())
        .await
        .unwrap();

    assert!(outcome.recovered);
    assert_eq!(outcome.state.name, StateName::from("apology"));

    drain().await;
    assert!(capture
        .snapshot()
        .iter()
        .any(|e| matches!(e, CallEvent::TransitionError { .. })));
}

#[tokio::test]
async fn accumulated_options_survive_a_recovered_transition() {
    let machine = MachineBuilder::new("recovering", "start")
        .state("start", |_, _| Ok(vec![Directive::say("start")]))
        .state("broken", |_, _| {
            Err(CallFlowError::Resolver("backend down".to_string()))
        })
        .state("apology", |_, _| Ok(vec![Directive::say("Sorry")]))
        .rule(RulePattern::on("start"), NextAction::goto("broken"))
        .on_transition_error(|_, _, _, _| Ok(Recovery::to_state("apology", Options::new())))
        .build();
    let processor = processor_with(machine);
    let machine_id = MachineId::from("recovering");

    processor
        .process(
            &machine_id,
            in_progress("CA1"),
            options_from([("lang", json!("en"))]),
        )
        .await
        .unwrap();
    let outcome = processor
        .process(&machine_id, in_progress("CA1"), Options::new())
        .await
        .unwrap();

    assert!(outcome.recovered);
    // The recovered state is stored with the options collected before the
    // failure, not an emptied map.
    let session = processor.store().get(&"CA1".into()).unwrap();
    assert_eq!(session.state_name, StateName::from("apology"));
    assert_eq!(session.options["lang"], json!("en"));
}

#[tokio::test]
async fn delegation_hands_the_session_to_the_other_machine() {
    let main = MachineBuilder::new("main", "menu")
        .state("menu", |_, _| Ok(vec![Directive::say("menu")]))
        .rule(
            RulePattern::on("menu").when_input("Digits", "3"),
            NextAction::delegate("survey"),
        )
        .build();
    let survey_completions = Arc::new(AtomicUsize::new(0));
    let completions = survey_completions.clone();
    let survey = MachineBuilder::new("survey", "question")
        .state("question", |_, _| Ok(vec![Directive::say("Rate us")]))
        .state("thanks", |_, _| Ok(vec![Directive::say("Thanks")]))
        .rule(
            RulePattern::on("question").when_input_present("Digits"),
            NextAction::goto("thanks"),
        )
        .rule(RulePattern::on("thanks"), NextAction::goto("thanks"))
        .on_complete(move |_, _, _| {
            completions.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    let registry = Arc::new(MachineRegistry::new());
    registry.register(main);
    registry.register(survey);
    registry.validate().unwrap();
    let processor = CallProcessor::new(registry, Arc::new(PlainTextRenderer));
    let machine_id = MachineId::from("main");

    processor
        .process(&machine_id, in_progress("CA1"), Options::new())
        .await
        .unwrap();
    let outcome = processor
        .process(
            &machine_id,
            in_progress("CA1").with_field("Digits", "3"),
            Options::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.state.machine, MachineId::from("survey"));

    // Subsequent requests transition on the delegated machine even though
    // the transport still posts against "main".
    let outcome = processor
        .process(
            &machine_id,
            in_progress("CA1").with_field("Digits", "5"),
            Options::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.state.name, StateName::from("thanks"));

    // Completion runs the hook of the machine the call ended on.
    processor
        .process(
            &machine_id,
            CallInput::new("CA1", CallStatus::Completed).with_field("Digits", "1"),
            Options::new(),
        )
        .await
        .unwrap();
    assert_eq!(survey_completions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn event_stream_for_a_full_call() {
    let processor = processor_with(ivr(Arc::new(AtomicUsize::new(0))));
    let machine_id = MachineId::from("ivr");
    let capture = Arc::new(Capture::default());
    processor.events().subscribe(capture.clone()).await;

    processor
        .process(&machine_id, in_progress("CA1"), Options::new())
        .await
        .unwrap();
    processor
        .process(
            &machine_id,
            in_progress("CA1").with_field("Digits", "1"),
            Options::new(),
        )
        .await
        .unwrap();
    processor
        .process(
            &machine_id,
            CallInput::new("CA1", CallStatus::Completed),
            Options::new(),
        )
        .await
        .unwrap();

    drain().await;
    let events = capture.snapshot();
    assert!(matches!(events[0], CallEvent::CallStarted { .. }));
    assert!(
        matches!(&events[1], CallEvent::Transitioned { from, to, .. }
            if from == &StateName::from("greeting") && to == &StateName::from("english"))
    );
    assert!(matches!(events.last().unwrap(), CallEvent::CallCompleted { .. }));
}
