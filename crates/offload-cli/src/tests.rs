//! Scenario tests for the client state machine.

use std::io;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use rstest::rstest;

use offload_flags::{DriverTrace, TraceError};
use offload_net::{Endpoint, NetError};
use offload_proto::{Envelope, FrameError, Status, StatusCode};

use crate::client::{DaemonChannel, DaemonConnector, Verdict, do_main};
use crate::config::Config;
use crate::driver::{CommandExpander, DriverError};

// ---------------------------------------------------------------------------
// Doubles
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Counters {
    connects: AtomicU32,
    sends: AtomicU32,
    reads: AtomicU32,
    connections_created: AtomicU32,
}

impl Counters {
    fn snapshot(&self) -> (u32, u32, u32, u32) {
        (
            self.connects.load(Ordering::SeqCst),
            self.sends.load(Ordering::SeqCst),
            self.reads.load(Ordering::SeqCst),
            self.connections_created.load(Ordering::SeqCst),
        )
    }
}

struct FixedExpander {
    trace: DriverTrace,
}

impl CommandExpander for FixedExpander {
    fn expand(&self, _argv: &[String]) -> Result<DriverTrace, DriverError> {
        Ok(self.trace.clone())
    }
}

struct FailingExpander;

impl CommandExpander for FailingExpander {
    fn expand(&self, _argv: &[String]) -> Result<DriverTrace, DriverError> {
        Err(DriverError::Unparsable(TraceError::NoCommands))
    }
}

/// A connector whose channels behave as scripted.
struct ScriptedConnector {
    counters: Arc<Counters>,
    accept_connections: bool,
    fail_send: bool,
    reply: Option<Envelope>,
    sent: Arc<Mutex<Option<Envelope>>>,
}

impl ScriptedConnector {
    fn new(reply: Option<Envelope>) -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            accept_connections: true,
            fail_send: false,
            reply,
            sent: Arc::new(Mutex::new(None)),
        }
    }

    fn refusing() -> Self {
        let mut connector = Self::new(None);
        connector.accept_connections = false;
        connector
    }

    fn sent_request(&self) -> Option<Envelope> {
        self.sent.lock().expect("sent mutex").clone()
    }
}

impl DaemonConnector for ScriptedConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn DaemonChannel>, NetError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        if !self.accept_connections {
            return Err(NetError::Connect {
                endpoint: endpoint.to_string(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            });
        }
        self.counters
            .connections_created
            .fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedChannel {
            counters: Arc::clone(&self.counters),
            fail_send: self.fail_send,
            reply: self.reply.clone(),
            sent: Arc::clone(&self.sent),
        }))
    }
}

struct ScriptedChannel {
    counters: Arc<Counters>,
    fail_send: bool,
    reply: Option<Envelope>,
    sent: Arc<Mutex<Option<Envelope>>>,
}

impl DaemonChannel for ScriptedChannel {
    fn send(&mut self, message: &Envelope) -> Result<(), FrameError> {
        self.counters.sends.fetch_add(1, Ordering::SeqCst);
        if self.fail_send {
            return Err(FrameError::Write(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        *self.sent.lock().expect("sent mutex") = Some(message.clone());
        Ok(())
    }

    fn recv(&mut self) -> Result<Envelope, FrameError> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        self.reply.clone().ok_or(FrameError::Truncated)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn wrapper_argv(input: &Utf8Path) -> Vec<String> {
    ["clang++", "-c", input.as_str()]
        .into_iter()
        .map(String::from)
        .collect()
}

fn trace_for(input: &Utf8Path) -> DriverTrace {
    let tokens = [
        "",
        "/usr/bin/clang",
        "-cc1",
        "-triple",
        "x86_64-unknown-linux-gnu",
        "-emit-obj",
        "-mrelax-all",
        "-main-file-name",
        "test.cc",
        "-coverage-file",
        "/tmp/test.o",
        "-o",
        "test.o",
        "-x",
        "c++",
        input.as_str(),
    ];
    DriverTrace {
        version: "clang version 3.4 (...) (...)".to_owned(),
        commands: vec![tokens.into_iter().map(String::from).collect()],
    }
}

fn configured() -> Config {
    Config {
        socket: Some(Endpoint::unix("/run/offloadd.sock")),
        compiler: Some(Utf8PathBuf::from("/usr/bin/clang++")),
        ..Config::default()
    }
}

fn temp_input() -> Utf8PathBuf {
    crate::util::create_temp_file(".cc").expect("create temp input")
}

fn status_reply(code: StatusCode) -> Option<Envelope> {
    Some(Envelope::Status(Status::new(code, "")))
}

struct Scenario {
    input: Utf8PathBuf,
    expander: FixedExpander,
}

impl Scenario {
    fn new() -> Self {
        let input = temp_input();
        let expander = FixedExpander {
            trace: trace_for(&input),
        };
        Self { input, expander }
    }

    fn run(&self, config: &Config, connector: &ScriptedConnector) -> Verdict {
        do_main(&wrapper_argv(&self.input), config, &self.expander, connector)
    }
}

impl Drop for Scenario {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.input);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[rstest]
fn no_socket_configured_stays_local() {
    let scenario = Scenario::new();
    let connector = ScriptedConnector::new(None);
    let config = Config {
        socket: None,
        ..configured()
    };

    assert_eq!(scenario.run(&config, &connector), Verdict::RunLocally);
    assert_eq!(connector.counters.snapshot(), (0, 0, 0, 0));
}

#[rstest]
fn no_compiler_configured_stays_local() {
    let scenario = Scenario::new();
    let connector = ScriptedConnector::new(None);
    let config = Config {
        compiler: None,
        ..configured()
    };

    assert_eq!(scenario.run(&config, &connector), Verdict::RunLocally);
    assert_eq!(connector.counters.snapshot(), (0, 0, 0, 0));
}

#[rstest]
fn expansion_failure_stays_local() {
    let input = temp_input();
    let connector = ScriptedConnector::new(None);

    let verdict = do_main(
        &wrapper_argv(&input),
        &configured(),
        &FailingExpander,
        &connector,
    );

    assert_eq!(verdict, Verdict::RunLocally);
    assert_eq!(connector.counters.snapshot(), (0, 0, 0, 0));
    let _ = std::fs::remove_file(&input);
}

#[rstest]
fn multi_command_plans_stay_local() {
    let scenario = Scenario::new();
    let mut trace = scenario.expander.trace.clone();
    trace.commands.push(
        ["", "/usr/bin/objcopy", "something", "some_file"]
            .into_iter()
            .map(String::from)
            .collect(),
    );
    let connector = ScriptedConnector::new(None);

    let verdict = do_main(
        &wrapper_argv(&scenario.input),
        &configured(),
        &FixedExpander { trace },
        &connector,
    );

    assert_eq!(verdict, Verdict::RunLocally);
    assert_eq!(connector.counters.snapshot(), (0, 0, 0, 0));
}

#[rstest]
fn missing_input_file_stays_local() {
    let missing = Utf8PathBuf::from("/tmp/offload-does-not-exist.cc");
    let expander = FixedExpander {
        trace: trace_for(&missing),
    };
    let connector = ScriptedConnector::new(None);

    let verdict = do_main(&wrapper_argv(&missing), &configured(), &expander, &connector);

    assert_eq!(verdict, Verdict::RunLocally);
    assert_eq!(connector.counters.snapshot(), (0, 0, 0, 0));
}

#[rstest]
fn refused_connection_falls_back() {
    let scenario = Scenario::new();
    let connector = ScriptedConnector::refusing();

    assert_eq!(scenario.run(&configured(), &connector), Verdict::RunLocally);
    assert_eq!(connector.counters.snapshot(), (1, 0, 0, 0));
}

#[rstest]
fn send_failure_falls_back() {
    let scenario = Scenario::new();
    let mut connector = ScriptedConnector::new(None);
    connector.fail_send = true;

    assert_eq!(scenario.run(&configured(), &connector), Verdict::RunLocally);
    assert_eq!(connector.counters.snapshot(), (1, 1, 0, 1));
}

#[rstest]
fn read_failure_falls_back_after_sending_the_request() {
    let scenario = Scenario::new();
    let connector = ScriptedConnector::new(None);

    assert_eq!(scenario.run(&configured(), &connector), Verdict::RunLocally);
    assert_eq!(connector.counters.snapshot(), (1, 1, 1, 1));

    let Some(Envelope::Execute(request)) = connector.sent_request() else {
        panic!("expected an execute request");
    };
    assert!(!request.remote);
    assert_eq!(
        request.current_dir,
        crate::util::current_dir().expect("current dir")
    );
    let flags = &request.flags;
    assert_eq!(flags.input, scenario.input);
    assert_eq!(flags.language.as_deref(), Some("c++"));
    assert_eq!(flags.action.as_deref(), Some("-emit-obj"));
    assert_eq!(flags.compiler.version, "clang version 3.4 (...) (...)");
    assert!(flags.other.iter().any(|flag| flag == "-cc1"));
    assert!(flags.other.iter().any(|flag| flag == "-triple"));
    assert!(flags.non_cached.iter().any(|flag| flag == "-main-file-name"));
    assert!(flags.non_cached.iter().any(|flag| flag == "-coverage-file"));
    assert_eq!(flags.cc_only, vec!["-mrelax-all".to_owned()]);
}

#[rstest]
fn reply_without_a_status_falls_back() {
    let scenario = Scenario::new();
    let echoed = trace_for(&scenario.input);
    let connector = ScriptedConnector::new(Some(Envelope::Execute(
        offload_proto::ExecuteRequest {
            flags: offload_flags::process_flags(
                &echoed.commands[0],
                &offload_flags::CachePolicy::default(),
            )
            .expect("classify"),
            current_dir: Utf8PathBuf::from("/tmp"),
            remote: true,
        },
    )));

    assert_eq!(scenario.run(&configured(), &connector), Verdict::RunLocally);
    assert_eq!(connector.counters.snapshot(), (1, 1, 1, 1));
}

#[rstest]
#[case::inconsequent(StatusCode::Inconsequent)]
#[case::no_version(StatusCode::NoVersion)]
#[case::overload(StatusCode::Overload)]
fn declining_statuses_fall_back(#[case] code: StatusCode) {
    let scenario = Scenario::new();
    let connector = ScriptedConnector::new(status_reply(code));

    assert_eq!(scenario.run(&configured(), &connector), Verdict::RunLocally);
    assert_eq!(connector.counters.snapshot(), (1, 1, 1, 1));
}

#[rstest]
fn execution_status_fails_without_a_local_retry() {
    let scenario = Scenario::new();
    let connector = ScriptedConnector::new(status_reply(StatusCode::Execution));

    assert_eq!(
        scenario.run(&configured(), &connector),
        Verdict::DaemonFailure(1)
    );
    assert_eq!(connector.counters.snapshot(), (1, 1, 1, 1));
}

#[rstest]
fn ok_status_completes_remotely() {
    let scenario = Scenario::new();
    let connector = ScriptedConnector::new(status_reply(StatusCode::Ok));

    assert_eq!(scenario.run(&configured(), &connector), Verdict::DoneRemotely);
    assert_eq!(connector.counters.snapshot(), (1, 1, 1, 1));
}
