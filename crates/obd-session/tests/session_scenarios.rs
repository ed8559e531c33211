//! End-to-end sessions against the ELM327 emulator

use std::time::Duration;

use futures::StreamExt;
use obd_protocol::{DecodeError, MockAdapter, ObdError, ObdResponse, ObdValue, Pid, ResponseDecoder};
use obd_session::{AdapterSession, CommandSchedule, SessionConfig};
use storage::{ReplayReader, SessionRecorder, RECORD_SIZE};

fn config(commands: &[&str]) -> SessionConfig {
    SessionConfig {
        schedule: CommandSchedule::new(commands.iter().map(|c| c.to_string()).collect()).unwrap(),
        ..SessionConfig::default()
    }
}

/// Stream items with handshake chatter (`OK`, banner, echoes) filtered out
fn without_chatter(item: &Result<ObdResponse, ObdError>) -> bool {
    !matches!(item, Err(ObdError::Decode(DecodeError::AdapterMessage(_))))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rpm_response_is_recorded_and_replayed() {
    let adapter = MockAdapter::new().script("010C", "410C0320\r>");
    let mut session = AdapterSession::spawn(adapter, config(&["010C"])).unwrap();
    session.ready().await.unwrap();

    let response = {
        let responses = session.responses().filter(|item| futures::future::ready(without_chatter(item)));
        futures::pin_mut!(responses);
        responses.next().await.unwrap().unwrap()
    };
    session.shutdown().await.unwrap();

    assert_eq!(response.prefix(), b"410C");
    assert_eq!(response.payload(), b"0320");
    assert_eq!(response.value, ObdValue::Rational(200.0));

    let mut recorder = SessionRecorder::new(Vec::new(), 1000);
    recorder.record_response(&response).unwrap();
    let log = recorder.into_inner().unwrap();
    assert_eq!(log.len(), RECORD_SIZE);

    let decoder = ResponseDecoder::standard();
    let replayed: Vec<_> = ReplayReader::new(log.as_slice())
        .responses(&decoder)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].prefix(), response.prefix());
    assert_eq!(replayed[0].payload(), response.payload());
    assert_eq!(replayed[0].pid(), Some(Pid::Rpm));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_frame_does_not_interrupt_stream() {
    let adapter = MockAdapter::new()
        .script("010D", "41\r>")
        .script("010D", "410D32\r>");
    let mut session = AdapterSession::spawn(adapter, config(&["010D"])).unwrap();

    let items: Vec<_> = {
        let responses = session.responses().filter(|item| futures::future::ready(without_chatter(item)));
        responses.take(2).collect().await
    };
    session.shutdown().await.unwrap();

    assert!(matches!(
        &items[0],
        Err(ObdError::Decode(DecodeError::TooShort { actual: 2, .. }))
    ));
    let speed = items[1].as_ref().unwrap();
    assert_eq!(speed.pid(), Some(Pid::Speed));
    assert_eq!(speed.value, ObdValue::Integer(50));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_consumer_sees_every_response_in_order() {
    let mut session = AdapterSession::spawn(
        MockAdapter::new(),
        SessionConfig {
            pipe_capacity: 16,
            ..config(&["010D"])
        },
    )
    .unwrap();

    let mut speeds = Vec::new();
    {
        let responses = session.responses().filter(|item| futures::future::ready(without_chatter(item)));
        futures::pin_mut!(responses);
        while speeds.len() < 100 {
            let response = responses.next().await.unwrap().unwrap();
            if let ObdValue::Integer(speed) = response.value {
                speeds.push(speed);
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
    session.shutdown().await.unwrap();

    // The emulator counts speed up by one per reply
    assert!(speeds.windows(2).all(|w| w[1] == w[0] + 1), "{speeds:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transport_failure_ends_stream_with_error() {
    let adapter = MockAdapter::new().disconnect_after(3);
    let mut session = AdapterSession::spawn(adapter, config(&["010D"])).unwrap();

    let items: Vec<_> = session
        .responses()
        .filter(|item| futures::future::ready(without_chatter(item)))
        .collect()
        .await;

    assert_eq!(items.len(), 4);
    assert!(items[..3].iter().all(Result::is_ok));
    assert!(matches!(&items[3], Err(e) if e.is_transport()));

    assert!(session.shutdown().await.unwrap_err().is_transport());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_stops_running_session() {
    let adapter = MockAdapter::new().with_latency(Duration::from_millis(5));
    let mut session = AdapterSession::spawn(adapter, config(&["010C", "0105"])).unwrap();
    session.ready().await.unwrap();

    let first = {
        let responses = session.responses().filter(|item| futures::future::ready(without_chatter(item)));
        futures::pin_mut!(responses);
        responses.next().await.unwrap().unwrap()
    };
    assert_eq!(first.pid(), Some(Pid::Rpm));

    tokio::time::timeout(Duration::from_secs(5), session.shutdown())
        .await
        .unwrap()
        .unwrap();
}
