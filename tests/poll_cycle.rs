// Poll-cycle integration tests: a StatusPoller run against a mock brick
// serving WbStatus.xml / WbCfg.xml, checked end to end through the
// registry and event queue.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use webbrick_lan_bridge::{
    event_queue, DeviceCategory, DeviceRegistry, DriverConfig, EventReceiver, Observation,
    StatusPoller, UpsertOrigin, WebbrickError,
};

const STATUS_LIGHT_ON: &str = r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<WebbrickStatus Ver="6.1.614">
    <SN>25</SN>
    <AOs><AO id="0">85</AO><AO id="1">0</AO></AOs>
    <Tmps><Tmp id="0" lo="-800" hi="1600">320</Tmp></Tmps>
</WebbrickStatus>"#;

const STATUS_LIGHT_OFF: &str = r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<WebbrickStatus Ver="6.1.614">
    <SN>25</SN>
    <AOs><AO id="0">0</AO><AO id="1">0</AO></AOs>
    <Tmps><Tmp id="0" lo="-800" hi="1600">320</Tmp></Tmps>
</WebbrickStatus>"#;

const CONFIG_DOC: &str = r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<WebbrickConfig Ver="6.1.614">
    <NN>Documen</NN>
    <SI ip="10.100.100.101" mac="00:03:75:0F:83:99"/>
    <CDs><CD id="0" Name="Door" Opt="2"/><CD id="1" Name="Landing" Opt="2"/></CDs>
    <CTs><CT id="0" Name="Zone 1"/></CTs>
    <NOs><NO id="0" Name="Boiler"/></NOs>
    <NAs><NA id="0" Name="HallWay"/><NA id="1" Name="External"/></NAs>
</WebbrickConfig>"#;

struct Fixture {
    server: mockito::ServerGuard,
    poller: StatusPoller,
    registry: Arc<DeviceRegistry>,
    events: EventReceiver,
}

async fn fixture(config: DriverConfig) -> Fixture {
    let server = mockito::Server::new_async().await;
    let port: u16 = server
        .host_with_port()
        .rsplit(':')
        .next()
        .unwrap()
        .parse()
        .unwrap();

    let mut config = config;
    config.http_port = port;
    config.http_timeout = Duration::from_secs(2);
    let config = Arc::new(config);

    let (queue, events) = event_queue(64);
    let registry = Arc::new(DeviceRegistry::new(queue));

    // Seed the brick the way the UDP path would: via its heartbeat.
    let ip: IpAddr = "127.0.0.1".parse().unwrap();
    registry
        .upsert(Observation {
            uid: "25::ST::0".to_string(),
            category: DeviceCategory::Heartbeat,
            channel: 0,
            ip,
            brick_id: 25,
            state: false,
            level: 0.0,
            name: None,
            message: "Seen at 14:30:54".to_string(),
            origin: UpsertOrigin::Udp,
        })
        .await;

    let poller = StatusPoller::new(
        reqwest::Client::new(),
        Arc::clone(&registry),
        Arc::clone(&config),
    );

    Fixture {
        server,
        poller,
        registry,
        events,
    }
}

fn drain(events: &mut EventReceiver) -> Vec<String> {
    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name);
    }
    names
}

#[tokio::test]
async fn poll_discovers_every_channel_family() {
    let mut fx = fixture(DriverConfig::default()).await;
    fx.server
        .mock("GET", "/WbStatus.xml")
        .with_body(STATUS_LIGHT_ON)
        .create_async()
        .await;
    fx.server
        .mock("GET", "/WbCfg.xml")
        .with_body(CONFIG_DOC)
        .create_async()
        .await;

    // Drop the heartbeat's own event before polling
    drain(&mut fx.events);

    let count = fx.poller.poll_once(25).await.unwrap();
    // 2 lights + 2 inputs + 1 output + 1 temp
    assert_eq!(count, 6);
    assert_eq!(fx.registry.len().await, 7); // + the seeded heartbeat

    let light = fx.registry.get("25::AO::0").await.unwrap();
    assert_eq!(light.category, DeviceCategory::Light);
    assert_eq!(light.name, "HallWay");
    assert!(light.state);
    assert_eq!(light.level, 85.0);
    assert!(light.queried);

    let button = fx.registry.get("25::TD::1").await.unwrap();
    assert_eq!(button.category, DeviceCategory::Button);
    assert_eq!(button.name, "Landing");

    let output = fx.registry.get("25::DO::0").await.unwrap();
    assert_eq!(output.category, DeviceCategory::State);
    assert_eq!(output.name, "Boiler");

    // 320 sixteenths = 20.0 degrees
    let temp = fx.registry.get("25::CT::0").await.unwrap();
    assert_eq!(temp.category, DeviceCategory::Temp);
    assert_eq!(temp.level, 20.0);

    let names = drain(&mut fx.events);
    assert_eq!(names.iter().filter(|n| *n == "newlightchannelfound").count(), 2);
    assert!(names.contains(&"newbuttonfound".to_string()));
    assert!(names.contains(&"newoutputfound".to_string()));
    assert!(names.contains(&"newtempfound".to_string()));
}

#[tokio::test]
async fn second_poll_updates_in_place() {
    let mut fx = fixture(DriverConfig::default()).await;
    fx.server
        .mock("GET", "/WbStatus.xml")
        .with_body(STATUS_LIGHT_ON)
        .create_async()
        .await;
    fx.server
        .mock("GET", "/WbCfg.xml")
        .with_body(CONFIG_DOC)
        .create_async()
        .await;

    fx.poller.poll_once(25).await.unwrap();
    let first_cycle = drain(&mut fx.events);
    assert!(first_cycle.contains(&"newlightchannelfound".to_string()));
    assert!(fx.registry.get("25::AO::0").await.unwrap().state);

    // The light reads 85 on the first cycle, 0 on the second
    fx.server
        .mock("GET", "/WbStatus.xml")
        .with_body(STATUS_LIGHT_OFF)
        .create_async()
        .await;

    let count = fx.poller.poll_once(25).await.unwrap();
    assert_eq!(count, 6);
    assert_eq!(fx.registry.len().await, 7); // nothing new

    let light = fx.registry.get("25::AO::0").await.unwrap();
    assert!(!light.state);
    assert_eq!(light.level, 0.0);
    assert_eq!(light.last_message, "HallWay is off");

    let names = drain(&mut fx.events);
    assert_eq!(
        names
            .iter()
            .filter(|n| *n == "existinglightchannelupdated")
            .count(),
        2
    );
    assert!(names.contains(&"existingbuttonupdated".to_string()));
    assert!(names.contains(&"existingoutputupdated".to_string()));
}

#[tokio::test]
async fn pir_list_reclassifies_digital_inputs() {
    let config = DriverConfig::builder().pir("25::TD::0").build();
    let mut fx = fixture(config).await;
    fx.server
        .mock("GET", "/WbStatus.xml")
        .with_body(STATUS_LIGHT_ON)
        .create_async()
        .await;
    fx.server
        .mock("GET", "/WbCfg.xml")
        .with_body(CONFIG_DOC)
        .create_async()
        .await;

    fx.poller.poll_once(25).await.unwrap();

    let pir = fx.registry.get("25::TD::0").await.unwrap();
    assert_eq!(pir.category, DeviceCategory::Pir);
    let button = fx.registry.get("25::TD::1").await.unwrap();
    assert_eq!(button.category, DeviceCategory::Button);

    let names = drain(&mut fx.events);
    assert!(names.contains(&"newpirfound".to_string()));
}

#[tokio::test]
async fn denylisted_uid_never_registered_from_poll() {
    let config = DriverConfig::builder().deny("25::AO::1").build();
    let mut fx = fixture(config).await;
    fx.server
        .mock("GET", "/WbStatus.xml")
        .with_body(STATUS_LIGHT_ON)
        .create_async()
        .await;
    fx.server
        .mock("GET", "/WbCfg.xml")
        .with_body(CONFIG_DOC)
        .create_async()
        .await;

    let count = fx.poller.poll_once(25).await.unwrap();
    assert_eq!(count, 5);
    assert!(fx.registry.get("25::AO::1").await.is_none());

    let names = drain(&mut fx.events);
    assert_eq!(names.iter().filter(|n| *n == "newlightchannelfound").count(), 1);
}

#[tokio::test]
async fn failed_config_fetch_aborts_cycle_without_partial_merge() {
    let mut fx = fixture(DriverConfig::default()).await;
    fx.server
        .mock("GET", "/WbStatus.xml")
        .with_body(STATUS_LIGHT_ON)
        .create_async()
        .await;
    fx.server
        .mock("GET", "/WbCfg.xml")
        .with_status(500)
        .create_async()
        .await;

    let err = fx.poller.poll_once(25).await.unwrap_err();
    assert!(matches!(err, WebbrickError::Http(_)));
    // Status was fetched fine but nothing may be merged
    assert_eq!(fx.registry.len().await, 1); // heartbeat only
}

#[tokio::test]
async fn malformed_xml_aborts_cycle() {
    let mut fx = fixture(DriverConfig::default()).await;
    fx.server
        .mock("GET", "/WbStatus.xml")
        .with_body("<WebbrickStatus><SN>garbage")
        .create_async()
        .await;
    fx.server
        .mock("GET", "/WbCfg.xml")
        .with_body(CONFIG_DOC)
        .create_async()
        .await;

    let err = fx.poller.poll_once(25).await.unwrap_err();
    assert!(matches!(err, WebbrickError::Xml(_)));
    assert_eq!(fx.registry.len().await, 1);
}

#[tokio::test]
async fn unknown_brick_is_an_error() {
    let fx = fixture(DriverConfig::default()).await;
    let err = fx.poller.poll_once(99).await.unwrap_err();
    assert!(matches!(err, WebbrickError::UnknownBrick { brick_id: 99 }));
}
