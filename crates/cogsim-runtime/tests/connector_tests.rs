//! Authority, participants and named locks over local and TCP endpoints.

use cogsim_event::listener_fn;
use cogsim_runtime::connector::{
    ConnectorError, ConnectorEvent, CredentialStore, Credentials, Endpoint, MotorCommand, ParticipantSpec, Percept,
    Role,
};
use cogsim_runtime::controller::{Controller, ModelOutcome};
use cogsim_runtime::lock::{LockStep, UnlockStep, VariableContext};
use cogsim_runtime::model::{Action, Chunk, ChunkTemplate, Condition, ModelBuilder, Pattern, Production, Term, Value};
use cogsim_runtime::scheduler::{NeverTerminate, RunLimits};
use cogsim_runtime::{Participant, Runtime};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

async fn plain(runtime: &Runtime, endpoint: &Endpoint, identity: &str) -> Participant {
    runtime
        .connect_participant(endpoint, ParticipantSpec::new(Role::Sensor, Credentials::new(identity, "")))
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn phase_lock_hands_over_in_request_order() {
    let runtime = Runtime::default();
    let endpoint = Endpoint::local("barrier");
    let authority = runtime.bind_authority(&endpoint, CredentialStore::open()).await.unwrap();

    let x = Arc::new(plain(&runtime, &endpoint, "x").await);
    let y = Arc::new(plain(&runtime, &endpoint, "y").await);
    let vars = VariableContext::new().with("phase", 1);

    let name = LockStep::new("phase${phase}").run(&x, &vars).await.unwrap();
    assert_eq!(name, "phase1");
    assert_eq!(authority.lock_holder("phase1").await, Some(x.id()));

    let waiter = {
        let y = Arc::clone(&y);
        let vars = vars.clone();
        tokio::spawn(async move { LockStep::new("phase${phase}").run(&y, &vars).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());
    assert_eq!(authority.lock_holder("phase1").await, Some(x.id()));

    UnlockStep::new("phase${phase}").run(&x, &vars).await.unwrap();
    let granted = tokio::time::timeout(WAIT, waiter).await.unwrap().unwrap().unwrap();
    assert_eq!(granted, "phase1");
    assert_eq!(authority.lock_holder("phase1").await, Some(y.id()));

    y.unlock("phase1").await.unwrap();
    x.disconnect().await.unwrap();
    y.disconnect().await.unwrap();
    authority.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnecting_holder_releases_to_next_waiter() {
    let runtime = Runtime::default();
    let endpoint = Endpoint::local("release");
    let authority = runtime.bind_authority(&endpoint, CredentialStore::open()).await.unwrap();

    let holder = plain(&runtime, &endpoint, "holder").await;
    let next = Arc::new(plain(&runtime, &endpoint, "next").await);
    holder.lock("checkpoint").await.unwrap();

    let waiter = {
        let next = Arc::clone(&next);
        tokio::spawn(async move { next.lock("checkpoint").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    holder.disconnect().await.unwrap();
    tokio::time::timeout(WAIT, waiter).await.unwrap().unwrap().unwrap();
    assert_eq!(authority.lock_holder("checkpoint").await, Some(next.id()));
    assert_eq!(authority.participant_count().await, 1);

    authority.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_link_also_releases_locks() {
    let runtime = Runtime::default();
    let endpoint = Endpoint::local("drop");
    let authority = runtime.bind_authority(&endpoint, CredentialStore::open()).await.unwrap();

    let holder = plain(&runtime, &endpoint, "holder").await;
    let next = Arc::new(plain(&runtime, &endpoint, "next").await);
    holder.lock("l").await.unwrap();
    let waiter = {
        let next = Arc::clone(&next);
        tokio::spawn(async move { next.lock("l").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    drop(holder);
    tokio::time::timeout(WAIT, waiter).await.unwrap().unwrap().unwrap();
    assert_eq!(authority.lock_holder("l").await, Some(next.id()));
    authority.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abandoned_lock_call_passes_the_lock_on() {
    let runtime = Runtime::default();
    let endpoint = Endpoint::local("abandon");
    let authority = runtime.bind_authority(&endpoint, CredentialStore::open()).await.unwrap();

    let x = plain(&runtime, &endpoint, "x").await;
    let y = plain(&runtime, &endpoint, "y").await;
    let z = plain(&runtime, &endpoint, "z").await;
    x.lock("a").await.unwrap();

    let gave_up = tokio::time::timeout(Duration::from_millis(50), y.lock("a")).await;
    assert!(gave_up.is_err());

    x.unlock("a").await.unwrap();
    tokio::time::timeout(WAIT, z.lock("a")).await.unwrap().unwrap();
    assert_eq!(authority.lock_holder("a").await, Some(z.id()));

    z.unlock("a").await.unwrap();
    authority.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_waiters_on_one_participant_each_get_the_lock() {
    let runtime = Runtime::default();
    let endpoint = Endpoint::local("shared-waiters");
    let authority = runtime.bind_authority(&endpoint, CredentialStore::open()).await.unwrap();

    let x = plain(&runtime, &endpoint, "x").await;
    let y = Arc::new(plain(&runtime, &endpoint, "y").await);
    x.lock("a").await.unwrap();

    let first = {
        let y = Arc::clone(&y);
        tokio::spawn(async move { y.lock("a").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = {
        let y = Arc::clone(&y);
        tokio::spawn(async move { y.lock("a").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    x.unlock("a").await.unwrap();
    tokio::time::timeout(WAIT, first).await.unwrap().unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!second.is_finished());

    y.unlock("a").await.unwrap();
    tokio::time::timeout(WAIT, second).await.unwrap().unwrap().unwrap();
    assert_eq!(authority.lock_holder("a").await, Some(y.id()));

    y.unlock("a").await.unwrap();
    authority.shutdown().await;
}

#[tokio::test]
async fn bad_credentials_are_rejected() {
    let runtime = Runtime::default();
    let endpoint = Endpoint::local("guarded");
    let store = CredentialStore::new().with(Credentials::new("eye", "s3cret"));
    let authority = runtime.bind_authority(&endpoint, store).await.unwrap();

    let wrong = runtime
        .connect_participant(&endpoint, ParticipantSpec::new(Role::Sensor, Credentials::new("eye", "nope")))
        .await
        .unwrap_err();
    assert!(matches!(wrong, ConnectorError::Rejected { .. }));

    let unknown = runtime
        .connect_participant(&endpoint, ParticipantSpec::new(Role::Sensor, Credentials::new("ear", "s3cret")))
        .await
        .unwrap_err();
    assert!(matches!(unknown, ConnectorError::Rejected { .. }));

    let ok = runtime
        .connect_participant(&endpoint, ParticipantSpec::new(Role::Sensor, Credentials::new("eye", "s3cret")))
        .await
        .unwrap();
    assert_eq!(authority.participant_count().await, 1);
    ok.disconnect().await.unwrap();
    authority.shutdown().await;
}

#[tokio::test]
async fn second_authority_on_endpoint_fails() {
    let runtime = Runtime::default();
    let endpoint = Endpoint::local("single");
    let first = runtime.bind_authority(&endpoint, CredentialStore::open()).await.unwrap();
    let err = runtime
        .bind_authority(&endpoint, CredentialStore::open())
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::EndpointInUse { .. }));
    first.shutdown().await;

    let missing = runtime
        .connect_participant(&endpoint, ParticipantSpec::new(Role::Sensor, Credentials::new("x", "")))
        .await
        .unwrap_err();
    assert!(matches!(missing, ConnectorError::EndpointNotFound { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tcp_participants_share_locks_and_time() {
    let runtime = Runtime::default();
    let authority = runtime
        .bind_authority(&Endpoint::Tcp("127.0.0.1:0".into()), CredentialStore::open())
        .await
        .unwrap();
    let endpoint = authority.endpoint().clone();
    assert!(matches!(&endpoint, Endpoint::Tcp(addr) if !addr.ends_with(":0")));

    let clocked = runtime
        .connect_participant(
            &endpoint,
            ParticipantSpec::new(Role::Agent, Credentials::new("a", "")).clocked(),
        )
        .await
        .unwrap();
    let other = plain(&runtime, &endpoint, "b").await;
    assert_eq!(clocked.session(), other.session());

    let granted = tokio::time::timeout(WAIT, clocked.request_time(0.5)).await.unwrap().unwrap();
    assert!(granted >= 0.5);
    assert!(authority.time().await >= 0.5);

    other.lock("tcp").await.unwrap();
    assert_eq!(authority.lock_holder("tcp").await, Some(other.id()));

    clocked.disconnect().await.unwrap();
    other.disconnect().await.unwrap();
    authority.shutdown().await;
    assert!(authority.is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn model_sees_sensor_percept_and_drives_effector() {
    let runtime = Runtime::default();
    let endpoint = Endpoint::local("world");
    let authority = runtime.bind_authority(&endpoint, CredentialStore::open()).await.unwrap();
    let runtime = runtime.with_connector(Arc::new(runtime.agent_connector(endpoint.clone())));

    let sensor = plain(&runtime, &endpoint, "eye").await;
    let effector = runtime
        .connect_participant(&endpoint, ParticipantSpec::new(Role::Effector, Credentials::new("hand", "")))
        .await
        .unwrap();
    let (motor_tx, mut motor_rx) = mpsc::unbounded_channel::<MotorCommand>();
    effector.events().register(listener_fn("motor", move |e: &ConnectorEvent| {
        if let ConnectorEvent::MotorReceived { command, .. } = e {
            let _ = motor_tx.send(command.clone());
        }
    }));

    let model = ModelBuilder::new("presser")
        .chunk_type("light", &["color"])
        .chunk_type("press", &["key"])
        .buffer("goal")
        .typed_buffer("visual", "light")
        .buffer("manual")
        .production(
            Production::new("react")
                .when(Pattern::on("visual").of_type("light").equals("color", Term::var("c")))
                .then(Action::request("manual", ChunkTemplate::of_type("press").slot("key", Term::var("c"))))
                .then(Action::clear("visual"))
                .then(Action::Stop),
        )
        .load()
        .unwrap();
    model.set_termination(Arc::new(NeverTerminate));

    let controller = Controller::new(&runtime);
    let id = controller.add_model(model.clone()).unwrap();
    controller.start().await.unwrap();

    let light = Chunk::new("l1", "light").with_slot("color", Value::symbol("green"));
    sensor.send_percept(Percept::new("visual", light).to("presser")).await.unwrap();

    let report = tokio::time::timeout(WAIT, controller.wait_for_completion()).await.unwrap();
    assert_eq!(report.outcome(&id), Some(&ModelOutcome::Completed));

    let command = tokio::time::timeout(WAIT, motor_rx.recv()).await.unwrap().unwrap();
    assert_eq!(command.source, "presser");
    assert_eq!(command.buffer, "manual");
    assert_eq!(command.command.get("key"), &Value::symbol("green"));

    sensor.disconnect().await.unwrap();
    effector.disconnect().await.unwrap();
    authority.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn agents_advance_in_lockstep() {
    let runtime = Runtime::default();
    let endpoint = Endpoint::local("lockstep");
    let authority = runtime.bind_authority(&endpoint, CredentialStore::open()).await.unwrap();
    let runtime = runtime.with_connector(Arc::new(runtime.agent_connector(endpoint.clone())));

    let controller = Controller::new(&runtime);
    for name in ["a", "b"] {
        let model = ModelBuilder::new(name)
            .chunk_type("count", &["n"])
            .buffer("goal")
            .chunk(Chunk::new("c0", "count").with_slot("n", Value::number(0.0)))
            .initial("goal", "c0")
            .production(
                Production::new("tick")
                    .when(Condition::full("goal"))
                    .then(Action::modify("goal", [("n", Term::num(1.0))])),
            )
            .load()
            .unwrap();
        model.set_limits(RunLimits::cycles(5));
        controller.add_model(model).unwrap();
    }

    controller.start().await.unwrap();
    let report = tokio::time::timeout(WAIT, controller.wait_for_completion()).await.unwrap();
    assert!(report.all_completed());
    assert!(authority.time().await >= 0.25 - 1e-9);

    tokio::time::timeout(WAIT, async {
        while authority.participant_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    authority.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn authority_shutdown_aborts_waiting_agent() {
    let runtime = Runtime::default();
    let endpoint = Endpoint::local("doomed");
    let authority = runtime.bind_authority(&endpoint, CredentialStore::open()).await.unwrap();
    let runtime = runtime.with_connector(Arc::new(runtime.agent_connector(endpoint.clone())));

    let model = ModelBuilder::new("idle")
        .chunk_type("start", &[])
        .buffer("goal")
        .production(
            Production::new("begin")
                .when(Condition::empty("goal"))
                .then(Action::set("goal", ChunkTemplate::of_type("start"))),
        )
        .load()
        .unwrap();
    model.set_termination(Arc::new(NeverTerminate));

    let controller = Controller::new(&runtime);
    let id = controller.add_model(model).unwrap();
    controller.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    authority.shutdown().await;
    let report = tokio::time::timeout(WAIT, controller.wait_for_completion()).await.unwrap();
    assert!(matches!(report.outcome(&id), Some(ModelOutcome::Aborted { .. })));
}
