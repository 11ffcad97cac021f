//! Calculator service over TCP, server and client in one process.
//!
//! Run with: cargo run --example tcp_calculator

use std::time::SystemTime;

use parley_codec::{describe_enum, describe_record};
use parley_session::{interface, Connection, ErrorCode};
use parley_stream::tcp;

#[derive(Debug, Clone, Copy, PartialEq)]
enum TelemetryKind {
    Beginning,
    End,
}

describe_enum!(TelemetryKind as i32 { Beginning, End });

#[derive(Debug, Clone)]
struct TelemetryEvent {
    event: String,
    kind: TelemetryKind,
    success: bool,
    time: SystemTime,
}

describe_record!(TelemetryEvent { event, kind, success, time });

interface! {
    trait Calculator;
    client CalculatorClient;
    dispatcher CalculatorDispatcher;
    methods {
        async fn simple_sum(a: i32, b: i32) -> i32;
        async fn array_sum(values: Vec<i32>) -> i32;
        async fn string_concatenate(a: String, b: String) -> String;
        fn send_telemetry_event(event: TelemetryEvent);
    }
}

struct CalculatorService;

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

    fn send_telemetry_event(&self, event: TelemetryEvent) {
        println!(
            "server: telemetry \"{}\" kind={:?} success={} at {:?}",
            event.event, event.kind, event.success, event.time
        );
    }
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(run())
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = tcp::Listener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    println!("listening on {addr}");

    let server_task = tokio::spawn(async move {
        let (transport, peer) = listener.accept().await?;
        println!("server: client connected from {peer}");

        let server = Connection::builder()
            .server(CalculatorDispatcher::new(CalculatorService))
            .build()
            .expect("a server role is configured");
        server.start(transport);
        Ok::<_, std::io::Error>(server)
    });

    let transport = tcp::connect(addr).await?;
    let connection = Connection::builder()
        .client::<CalculatorClient>()
        .build()
        .expect("a client role is configured");
    connection.start(transport);
    let calculator: CalculatorClient = connection.client();

    calculator.send_telemetry_event(TelemetryEvent {
        event: String::from("demo"),
        kind: TelemetryKind::Beginning,
        success: true,
        time: SystemTime::now(),
    })?;

    println!("simple_sum(17, 42) = {}", calculator.simple_sum(17, 42).await?);
    println!(
        "array_sum([17, 42, 33, -956]) = {}",
        calculator.array_sum(vec![17, 42, 33, -956]).await?
    );
    println!(
        "string_concatenate(\"Hello \", \"World!\") = {:?}",
        calculator
            .string_concatenate(String::from("Hello "), String::from("World!"))
            .await?
    );

    calculator.send_telemetry_event(TelemetryEvent {
        event: String::from("demo"),
        kind: TelemetryKind::End,
        success: true,
        time: SystemTime::now(),
    })?;

    let server = server_task.await??;
    connection.stop().await;
    server.stop().await;
    println!("done");
    Ok(())
}
