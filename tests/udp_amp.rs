use control4_amp::{
    query_status, AmpError, ConfigEntry, PowerState, Registry, Transport, UdpTransport, ZoneConfig,
    ZoneUpdate,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

/// Local stand-in for an amplifier
struct FakeAmp {
    port: u16,
    received: Arc<Mutex<Vec<String>>>,
    status: Arc<Mutex<Option<String>>>,
}

impl FakeAmp {
    async fn start() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let status: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let log = received.clone();
        let reply = status.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            while let Ok((len, from)) = socket.recv_from(&mut buf).await {
                let datagram = String::from_utf8_lossy(&buf[..len]).to_string();
                log.lock().unwrap().push(datagram.clone());

                let answer = if command_of(&datagram).split_whitespace().count() == 2 {
                    reply.lock().unwrap().clone()
                } else {
                    Some("OK".to_string())
                };
                if let Some(answer) = answer {
                    let _ = socket.send_to(answer.as_bytes(), from).await;
                }
            }
        });

        Self {
            port,
            received,
            status,
        }
    }

    fn set_status(&self, status: Option<&str>) {
        *self.status.lock().unwrap() = status.map(str::to_string);
    }

    fn raw(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    fn commands(&self) -> Vec<String> {
        self.raw().iter().map(|d| command_of(d).to_string()).collect()
    }

    /// Commands seen once at least `count` have arrived
    async fn wait_for(&self, count: usize) -> Vec<String> {
        for _ in 0..100 {
            if self.raw().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.commands()
    }

    fn clear(&self) {
        self.received.lock().unwrap().clear();
    }
}

// "0s2a42 c4.amp.out 01 \r\n" -> "c4.amp.out 01"
fn command_of(datagram: &str) -> &str {
    datagram
        .split_once(' ')
        .map(|(_, rest)| rest)
        .unwrap_or("")
        .trim_end()
}

fn entry(port: u16) -> ConfigEntry {
    let mut config = ZoneConfig::new("Kitchen", "127.0.0.1", port, 1);
    config.on_volume = 5;
    config.source_list = vec!["Tuner".into(), "TV".into(), "Server".into()];
    ConfigEntry::new(config)
}

#[tokio::test]
async fn test_turn_on_sends_volume_then_output() {
    let amp = FakeAmp::start().await;
    let registry = Registry::new(Arc::new(UdpTransport::with_timeout(Duration::from_millis(200))));
    let zone = registry.setup_entry(&entry(amp.port)).await.unwrap();

    zone.turn_on().await;

    assert_eq!(amp.wait_for(2).await, vec!["c4.amp.chvol 01 a5", "c4.amp.out 01 01"]);
    for datagram in amp.raw() {
        assert!(datagram.starts_with("0s2a"));
        assert!(datagram.ends_with(" \r\n"));
        let sequence: u8 = datagram[4..6].parse().unwrap();
        assert!((10..=99).contains(&sequence));
    }
    assert_eq!(zone.power(), PowerState::On);
    registry.shutdown().await;
}

#[tokio::test]
async fn test_control_commands_do_not_wait_for_replies() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = silent.local_addr().unwrap().port();
    let registry = Registry::new(Arc::new(UdpTransport::new()));
    let zone = registry.setup_entry(&entry(port)).await.unwrap();

    let started = std::time::Instant::now();
    zone.turn_on().await;
    zone.set_volume_level(0.3).await;
    zone.select_source("TV").await.unwrap();
    zone.turn_off().await;
    assert!(started.elapsed() < Duration::from_millis(250));

    let mut buf = [0u8; 64];
    let mut received = Vec::new();
    for _ in 0..5 {
        let (len, _) = silent.recv_from(&mut buf).await.unwrap();
        received.push(command_of(&String::from_utf8_lossy(&buf[..len])).to_string());
    }
    assert_eq!(
        received,
        vec![
            "c4.amp.chvol 01 a5",
            "c4.amp.out 01 01",
            "c4.amp.chvol 01 be",
            "c4.amp.out 01 02",
            "c4.amp.out 01 00",
        ]
    );
    registry.shutdown().await;
}

#[tokio::test]
async fn test_volume_source_and_power_off() {
    let amp = FakeAmp::start().await;
    let registry = Registry::new(Arc::new(UdpTransport::with_timeout(Duration::from_millis(200))));
    let zone = registry.setup_entry(&entry(amp.port)).await.unwrap();

    zone.set_volume_level(0.5).await;
    zone.select_source("Server").await.unwrap();
    zone.turn_off().await;

    assert_eq!(
        amp.wait_for(3).await,
        vec!["c4.amp.chvol 01 d2", "c4.amp.out 01 03", "c4.amp.out 01 00"]
    );
    assert!(matches!(
        zone.select_source("Radio").await,
        Err(AmpError::UnknownSource(name)) if name == "Radio"
    ));
    registry.shutdown().await;
}

#[tokio::test]
async fn test_status_query_round_trip() {
    let amp = FakeAmp::start().await;
    amp.set_status(Some("c4.amp.out 01 02"));
    let registry = Registry::new(Arc::new(UdpTransport::with_timeout(Duration::from_millis(200))));
    let zone = registry.setup_entry(&entry(amp.port)).await.unwrap();

    let status = query_status(&zone).await.unwrap().unwrap();
    assert!(status.is_on);
    assert_eq!(status.source_index, Some(2));
    assert_eq!(amp.commands(), vec!["c4.amp.out 01"]);

    assert!(zone.reconcile(status, Instant::now()));
    assert_eq!(zone.source(), "TV");
    assert_eq!(zone.power(), PowerState::On);
    registry.shutdown().await;
}

#[tokio::test]
async fn test_silent_amp_is_retried_once() {
    let amp = FakeAmp::start().await;
    let registry = Registry::new(Arc::new(UdpTransport::with_timeout(Duration::from_millis(100))));
    let zone = registry.setup_entry(&entry(amp.port)).await.unwrap();

    assert_eq!(query_status(&zone).await.unwrap(), None);
    assert_eq!(amp.commands(), vec!["c4.amp.out 01", "c4.amp.out 01"]);
    registry.shutdown().await;
}

#[tokio::test]
async fn test_unresolvable_host() {
    let transport = UdpTransport::with_timeout(Duration::from_millis(100));
    let result = transport.send_command("c4.amp.out 01", "amp.invalid", 8750).await;
    assert!(matches!(result, Err(AmpError::UnresolvableHost { port: 8750, .. })));
}

#[tokio::test]
async fn test_polling_picks_up_external_change() {
    let amp = FakeAmp::start().await;
    amp.set_status(Some("c4.amp.out 01 03"));
    let registry = Registry::new(Arc::new(UdpTransport::with_timeout(Duration::from_millis(200))));
    let mut updates = registry.subscribe_updates();

    let mut entry = entry(amp.port);
    entry.data.poll_external = true;
    entry.data.poll_interval = 1;
    let zone = registry.setup_entry(&entry).await.unwrap();

    let update = timeout(Duration::from_secs(3), updates.recv())
        .await
        .expect("no update within 3s")
        .unwrap();
    match update {
        ZoneUpdate::StateChanged(snapshot) => {
            assert_eq!(snapshot.entry_id, entry.entry_id);
            assert_eq!(snapshot.power, PowerState::On);
            assert_eq!(snapshot.source, "Server");
        }
        other => panic!("unexpected update {:?}", other),
    }
    assert_eq!(zone.source(), "Server");

    registry.unload_entry(entry.entry_id).await;
    amp.clear();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(amp.commands().is_empty());
}
