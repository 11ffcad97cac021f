//! End-to-end tests: a calculator service called over in-memory, framed
//! duplex and TCP transports.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::Notify;

use parley_codec::{describe_enum, describe_record, describe_variant};
use parley_session::{
    interface, BoxTransport, CallError, ClientMarshaller, Connection, ErrorCode, ErrorPhase,
};
use parley_stream::{mem, tcp, StreamTransport};

// ============================================================================
// Shared interface fixture
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum TelemetryKind {
    Beginning,
    End,
}

describe_enum!(TelemetryKind as i32 { Beginning, End });

#[derive(Debug, Clone, PartialEq)]
struct TelemetryEvent {
    event: String,
    kind: TelemetryKind,
    success: bool,
    time: SystemTime,
}

describe_record!(TelemetryEvent { event, kind, success, time });

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Int(i32),
    Text(String),
}

describe_variant!(Term {
    Int(i32) = 0,
    Text(String) = 1,
});

#[derive(Debug, Clone, PartialEq)]
struct AddError {
    description: String,
    code: i32,
}

describe_record!(AddError { description, code });

#[derive(Debug, Clone, PartialEq)]
enum AddOutcome {
    Int(i32),
    Text(String),
    Failed(AddError),
}

describe_variant!(AddOutcome {
    Int(i32) = 0,
    Text(String) = 1,
    Failed(AddError) = 2,
});

interface! {
    trait Calculator;
    client CalculatorClient;
    dispatcher CalculatorDispatcher;
    methods {
        async fn simple_sum(a: i32, b: i32) -> i32;
        async fn array_sum(values: Vec<i32>) -> i32;
        async fn string_concatenate(a: String, b: String) -> String;
        async fn universal_add(a: Term, b: Term) -> AddOutcome;
        async fn checked_div(a: i32, b: i32) -> i32;
        async fn slow_echo(delay_ms: i32, value: i32) -> i32;
        async fn touch();
        fn send_telemetry_event(event: TelemetryEvent);
    }
}

#[derive(Default, Clone)]
struct CalculatorService {
    telemetry: Arc<Mutex<Vec<TelemetryEvent>>>,
    touches: Arc<AtomicU32>,
}

impl Calculator for CalculatorService {
    async fn simple_sum(&self, a: i32, b: i32) -> Result<i32, ErrorCode> {
        Ok(a + b)
    }

    async fn array_sum(&self, values: Vec<i32>) -> Result<i32, ErrorCode> {
        Ok(values.iter().sum())
    }

    async fn string_concatenate(&self, a: String, b: String) -> Result<String, ErrorCode> {
        Ok(a + &b)
    }

    async fn universal_add(&self, a: Term, b: Term) -> Result<AddOutcome, ErrorCode> {
        Ok(match (a, b) {
            (Term::Int(x), Term::Int(y)) => AddOutcome::Int(x + y),
            (Term::Text(x), Term::Text(y)) => AddOutcome::Text(x + &y),
            _ => AddOutcome::Failed(AddError {
                description: String::from("incompatible argument types"),
                code: 1,
            }),
        })
    }

    async fn checked_div(&self, a: i32, b: i32) -> Result<i32, ErrorCode> {
        if b == 0 {
            return Err(ErrorCode::INVALID_ARG);
        }
        Ok(a / b)
    }

    async fn slow_echo(&self, delay_ms: i32, value: i32) -> Result<i32, ErrorCode> {
        tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
        Ok(value)
    }

    async fn touch(&self) -> Result<(), ErrorCode> {
        self.touches.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn send_telemetry_event(&self, event: TelemetryEvent) {
        self.telemetry.lock().unwrap().push(event);
    }
}

fn server_over(service: CalculatorService, transport: impl parley_session::Transport) -> Connection {
    let server = Connection::builder()
        .server(CalculatorDispatcher::new(service))
        .build()
        .unwrap();
    server.start(transport);
    server
}

fn client_over(transport: impl parley_session::Transport) -> (Connection, CalculatorClient) {
    let connection = Connection::builder()
        .client::<CalculatorClient>()
        .build()
        .unwrap();
    connection.start(transport);
    let client = connection.client::<CalculatorClient>();
    (connection, client)
}

fn start_pair(service: CalculatorService) -> (Connection, Connection, CalculatorClient) {
    let (client_transport, server_transport) = mem::pair();
    let server = server_over(service, server_transport);
    let (connection, client) = client_over(client_transport);
    (connection, server, client)
}

async fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

// ============================================================================
// Unary calls
// ============================================================================

#[tokio::test]
async fn simple_sum_resolves_with_the_sum() {
    let (connection, server, client) = start_pair(CalculatorService::default());

    assert_eq!(client.simple_sum(17, 42).await.unwrap(), 59);

    connection.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn array_sum_resolves_with_the_total() {
    let (connection, server, client) = start_pair(CalculatorService::default());

    assert_eq!(
        client.array_sum(vec![17, 42, 33, -956]).await.unwrap(),
        -864
    );

    connection.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn string_concatenate_resolves_with_the_concatenation() {
    let (connection, server, client) = start_pair(CalculatorService::default());

    assert_eq!(
        client
            .string_concatenate(String::from("Hello "), String::from("World!"))
            .await
            .unwrap(),
        "Hello World!"
    );

    connection.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn universal_add_dispatches_on_the_variant() {
    let (connection, server, client) = start_pair(CalculatorService::default());

    assert_eq!(
        client
            .universal_add(Term::Int(42), Term::Int(33))
            .await
            .unwrap(),
        AddOutcome::Int(75)
    );
    assert_eq!(
        client
            .universal_add(Term::Text(String::from("Hi")), Term::Text(String::from("!")))
            .await
            .unwrap(),
        AddOutcome::Text(String::from("Hi!"))
    );
    let mismatched = client
        .universal_add(Term::Int(42), Term::Text(String::from("Hello World!")))
        .await
        .unwrap();
    assert!(matches!(mismatched, AddOutcome::Failed(ref error) if error.code == 1));

    connection.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn handler_error_codes_reach_the_caller() {
    let (connection, server, client) = start_pair(CalculatorService::default());

    assert_eq!(client.checked_div(84, 2).await.unwrap(), 42);
    assert_eq!(
        client.checked_div(1, 0).await,
        Err(CallError::Remote(ErrorCode::INVALID_ARG))
    );

    connection.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn unit_results_travel_as_empty_payloads() {
    let service = CalculatorService::default();
    let (connection, server, client) = start_pair(service.clone());

    client.touch().await.unwrap();
    client.touch().await.unwrap();
    assert_eq!(service.touches.load(Ordering::Relaxed), 2);

    connection.stop().await;
    server.stop().await;
}

// ============================================================================
// Pipelining
// ============================================================================

#[tokio::test]
async fn concurrent_calls_share_one_connection() {
    let (connection, server, client) = start_pair(CalculatorService::default());

    let started = Instant::now();
    let (a, b, c, d) = tokio::join!(
        client.slow_echo(150, 1),
        client.slow_echo(150, 2),
        client.slow_echo(150, 3),
        client.slow_echo(150, 4),
    );
    assert_eq!(a.unwrap(), 1);
    assert_eq!(b.unwrap(), 2);
    assert_eq!(c.unwrap(), 3);
    assert_eq!(d.unwrap(), 4);

    // Four 150ms handlers run concurrently, not back to back.
    assert!(
        started.elapsed() < Duration::from_millis(450),
        "calls did not overlap: {:?}",
        started.elapsed()
    );

    connection.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn responses_complete_out_of_submission_order() {
    let (connection, server, client) = start_pair(CalculatorService::default());

    let slow = tokio::spawn({
        let client = client.clone();
        async move { client.slow_echo(300, 10).await }
    });
    // Give the slow call a head start on the wire.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let fast = client.slow_echo(1, 20).await.unwrap();
    assert_eq!(fast, 20);
    assert!(!slow.is_finished(), "slow call must still be pending");
    assert_eq!(slow.await.unwrap().unwrap(), 10);

    connection.stop().await;
    server.stop().await;
}

// ============================================================================
// Fire-and-forget
// ============================================================================

#[tokio::test]
async fn telemetry_is_delivered_without_a_response() {
    let service = CalculatorService::default();
    let (connection, server, client) = start_pair(service.clone());

    let event = TelemetryEvent {
        event: String::from("Test 1"),
        kind: TelemetryKind::Beginning,
        success: true,
        time: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
    };
    client.send_telemetry_event(event.clone()).unwrap();

    let telemetry = service.telemetry.clone();
    wait_until(move || !telemetry.lock().unwrap().is_empty()).await;
    assert_eq!(service.telemetry.lock().unwrap()[0], event);

    connection.stop().await;
    server.stop().await;
}

// ============================================================================
// Unknown methods
// ============================================================================

interface! {
    trait Extended;
    client ExtendedClient;
    dispatcher ExtendedDispatcher;
    methods {
        async fn simple_sum(a: i32, b: i32) -> i32;
        async fn cube(x: i32) -> i32;
    }
}

#[tokio::test]
async fn unknown_method_resolves_as_not_implemented() {
    let (client_transport, server_transport) = mem::pair();
    let server = server_over(CalculatorService::default(), server_transport);

    let connection = Connection::builder()
        .client::<ExtendedClient>()
        .build()
        .unwrap();
    connection.start(client_transport);
    let client = connection.client::<ExtendedClient>();

    // The shared method resolves; ids derive from names, not declarations.
    assert_eq!(client.simple_sum(2, 3).await.unwrap(), 5);
    // The extra one is unknown to the server.
    assert_eq!(
        client.cube(3).await,
        Err(CallError::Remote(ErrorCode::NOT_IMPL))
    );

    connection.stop().await;
    server.stop().await;
}

// ============================================================================
// Shutdown
// ============================================================================

interface! {
    trait Blocker;
    client BlockerClient;
    dispatcher BlockerDispatcher;
    methods {
        async fn stall() -> i32;
    }
}

struct BlockerService {
    entered: Arc<Notify>,
}

impl Blocker for BlockerService {
    async fn stall(&self) -> Result<i32, ErrorCode> {
        self.entered.notify_one();
        std::future::pending().await
    }
}

#[tokio::test]
async fn stop_aborts_outstanding_calls_and_quiesces_handlers() {
    let (client_transport, server_transport) = mem::pair();

    let entered = Arc::new(Notify::new());
    let server = Connection::builder()
        .server(BlockerDispatcher::new(BlockerService {
            entered: entered.clone(),
        }))
        .build()
        .unwrap();
    server.start(server_transport);

    let connection = Connection::builder()
        .client::<BlockerClient>()
        .build()
        .unwrap();
    connection.start(client_transport);
    let client = connection.client::<BlockerClient>();

    let call = tokio::spawn(async move { client.stall().await });
    entered.notified().await;

    // The handler is in flight and will never finish on its own; stop must
    // abort the call and still return.
    tokio::time::timeout(Duration::from_secs(5), connection.stop())
        .await
        .expect("client stop must not hang");
    assert_eq!(
        call.await.expect("call task must not panic"),
        Err(CallError::Cancelled)
    );

    // Server-side stop waits for the reader, which waits for the handler to
    // observe cancellation.
    tokio::time::timeout(Duration::from_secs(5), server.stop())
        .await
        .expect("server stop must not hang");
    assert!(!server.is_running());
}

#[tokio::test]
async fn stopped_connection_can_restart_on_a_fresh_transport() {
    let service = CalculatorService::default();
    let (connection, server, client) = start_pair(service.clone());

    assert_eq!(client.simple_sum(1, 1).await.unwrap(), 2);
    connection.stop().await;
    server.stop().await;
    assert!(!connection.is_running());

    // Both ends come back on a new transport pair.
    let (client_transport, server_transport) = mem::pair();
    server.start(server_transport);
    connection.start(client_transport);

    assert_eq!(client.simple_sum(20, 22).await.unwrap(), 42);

    connection.stop().await;
    server.stop().await;
}

// ============================================================================
// Error reporting
// ============================================================================

#[tokio::test]
async fn transport_failure_is_latched_until_a_handler_arrives() {
    let (client_transport, server_transport) = mem::pair();
    let (connection, client) = client_over(client_transport);

    // The peer goes away without ever speaking.
    drop(server_transport);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    connection.on_error(move |code, phase| {
        let _ = tx.send((code, phase));
    });
    let (code, phase) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("error must be delivered")
        .expect("handler must fire");
    assert_eq!(code, ErrorCode::CONNECTION_RESET);
    assert_eq!(phase, ErrorPhase::Receive);

    // The failure cancelled the lifecycle; new calls fail locally.
    assert_eq!(client.simple_sum(1, 1).await, Err(CallError::Cancelled));

    connection.stop().await;
}

// ============================================================================
// Marshaller-role configurations
// ============================================================================

interface! {
    trait EventLog;
    client EventLogClient;
    dispatcher EventLogDispatcher;
    methods {
        fn log_line(line: String);
    }
}

#[derive(Default, Clone)]
struct EventLogService {
    lines: Arc<Mutex<Vec<String>>>,
}

impl EventLog for EventLogService {
    fn log_line(&self, line: String) {
        self.lines.lock().unwrap().push(line);
    }
}

#[tokio::test]
async fn void_only_interfaces_run_without_unneeded_tasks() {
    assert!(EventLogClient::ONLY_VOID_METHODS);
    assert!(!CalculatorClient::ONLY_VOID_METHODS);

    let (client_transport, server_transport) = mem::pair();

    // Server side: fire-and-forget-only dispatcher, no client. Its writer
    // is never armed; nothing is ever sent back.
    let service = EventLogService::default();
    let server = Connection::builder()
        .server(EventLogDispatcher::new(service.clone()))
        .build()
        .unwrap();
    server.start(server_transport);

    // Client side: fire-and-forget-only interface, no server. Its reader
    // is never armed.
    let connection = Connection::builder()
        .client::<EventLogClient>()
        .build()
        .unwrap();
    connection.start(client_transport);
    let client = connection.client::<EventLogClient>();

    client.log_line(String::from("one")).unwrap();
    client.log_line(String::from("two")).unwrap();

    let lines = service.lines.clone();
    wait_until(move || lines.lock().unwrap().len() == 2).await;
    assert_eq!(*service.lines.lock().unwrap(), vec!["one", "two"]);

    connection.stop().await;
    server.stop().await;
}

// ============================================================================
// Other transports
// ============================================================================

#[tokio::test]
async fn calculator_over_a_boxed_transport() {
    let (client_transport, server_transport) = mem::pair();
    let server = server_over(CalculatorService::default(), BoxTransport::new(server_transport));
    let (connection, client) = client_over(BoxTransport::new(client_transport));

    assert_eq!(client.simple_sum(8, 9).await.unwrap(), 17);

    connection.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn calculator_over_a_framed_byte_stream() {
    let (left, right) = tokio::io::duplex(256 * 1024);
    let server = server_over(CalculatorService::default(), StreamTransport::new(right));
    let (connection, client) = client_over(StreamTransport::new(left));

    assert_eq!(client.simple_sum(17, 42).await.unwrap(), 59);
    assert_eq!(
        client
            .string_concatenate(String::from("Hello "), String::from("World!"))
            .await
            .unwrap(),
        "Hello World!"
    );
    assert_eq!(
        client
            .universal_add(Term::Int(1), Term::Int(2))
            .await
            .unwrap(),
        AddOutcome::Int(3)
    );

    connection.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn calculator_over_tcp() {
    let listener = tcp::Listener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_task = tokio::spawn(async move {
        let (transport, _peer) = listener.accept().await.unwrap();
        server_over(CalculatorService::default(), transport)
    });

    let transport = tcp::connect(addr).await.unwrap();
    let (connection, client) = client_over(transport);

    assert_eq!(client.simple_sum(17, 42).await.unwrap(), 59);
    assert_eq!(client.array_sum(vec![1, 2, 3]).await.unwrap(), 6);

    let server = server_task.await.unwrap();
    connection.stop().await;
    server.stop().await;
}
