//! The operator control plane against a live cache system.

use std::rc::Rc;

use lockstep::agent::TrafficAgent;
use lockstep::config::CacheConfig;
use lockstep::connection::{Connection, DirectConnection};
use lockstep::engine::{Engine, SerialEngine};
use lockstep::freq::Freq;
use lockstep::mem::cache::Cache;
use lockstep::mem::{IdealMemory, MemMsg, SingleLowModuleFinder};
use lockstep::monitor::{Monitor, MonitorError};
use lockstep::msg::SampleMsg;
use lockstep::port::Port;

struct System {
    engine: Rc<SerialEngine>,
    monitor: Monitor,
    _keep: (
        Rc<std::cell::RefCell<lockstep::TickingComponent<Cache>>>,
        Rc<std::cell::RefCell<lockstep::TickingComponent<IdealMemory>>>,
        Rc<std::cell::RefCell<DirectConnection<MemMsg>>>,
    ),
}

fn system() -> System {
    let engine = Rc::new(SerialEngine::new());
    let memory = IdealMemory::build("Mem", engine.clone(), Freq::new(1), 10, 1, 4);
    let mem_port = memory.borrow().inner().top_port().clone();
    let cache = Cache::builder(engine.clone())
        .with_config(CacheConfig::default())
        .with_low_module_finder(SingleLowModuleFinder { port: mem_port.id() })
        .build("L1")
        .unwrap();

    let conn = DirectConnection::<MemMsg>::builder(engine.clone()).build("BottomConn");
    conn.borrow_mut()
        .plug_in(cache.borrow().inner().bottom_port().clone(), 1);
    conn.borrow_mut().plug_in(mem_port, 1);

    let mut monitor = Monitor::new(engine.clone(), engine.run_control());
    monitor.register_component(&cache);
    monitor.register_component(&memory);
    monitor.register_connection(&conn);

    System {
        engine,
        monitor,
        _keep: (cache, memory, conn),
    }
}

#[test]
fn test_list_components_in_registration_order() {
    let sys = system();
    assert_eq!(sys.monitor.list_components(), vec!["L1", "Mem", "BottomConn"]);

    let body = sys.monitor.handle("/api/list_components").unwrap();
    let names: Vec<String> = serde_json::from_str(&body).unwrap();
    assert_eq!(names, ["L1", "Mem", "BottomConn"]);
}

#[test]
fn test_component_details_list_descriptors() {
    let sys = system();
    let details = sys.monitor.component_details("L1").unwrap();

    assert_eq!(details["name"], "L1");
    let fields = details["fields"].as_array().unwrap();
    let names: Vec<_> = fields.iter().map(|f| f["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"paused"));
    assert!(names.contains(&"stats"));
    let paused = fields.iter().find(|f| f["name"] == "paused").unwrap();
    assert_eq!(paused["kind"], "Bool");
    assert_eq!(paused["value"], false);
}

#[test]
fn test_field_route_walks_paths() {
    let sys = system();

    let body = sys
        .monitor
        .handle(r#"/api/field/{"comp_name":"L1","field_name":"stats.read_hits"}"#)
        .unwrap();
    assert_eq!(body, "0");

    let body = sys
        .monitor
        .handle(r#"/api/field/{"comp_name":"BottomConn","field_name":"ends.1.capacity"}"#)
        .unwrap();
    assert_eq!(body, "1");

    let body = sys
        .monitor
        .handle(r#"/api/field/{"comp_name":"Mem","field_name":"latency"}"#)
        .unwrap();
    assert_eq!(body, "10");
}

#[test]
fn test_protocol_errors() {
    let sys = system();

    assert!(matches!(
        sys.monitor.handle("/api/reboot"),
        Err(MonitorError::UnknownRoute(_))
    ));
    assert!(matches!(
        sys.monitor.handle("/api/field/{not json"),
        Err(MonitorError::MalformedRequest(_))
    ));
    assert!(matches!(
        sys.monitor.handle("/api/component/L2"),
        Err(MonitorError::UnknownComponent(_))
    ));
    assert!(matches!(
        sys.monitor
            .handle(r#"/api/field/{"comp_name":"L1","field_name":"bank_bufs.9"}"#),
        Err(MonitorError::BadIndex { .. })
    ));
}

#[test]
fn test_pause_and_continue_routes() {
    let sys = system();
    let control = sys.engine.run_control();

    assert_eq!(sys.monitor.handle("/api/pause").unwrap(), r#"{"paused":true}"#);
    assert!(control.is_paused());
    assert_eq!(sys.monitor.handle("/api/continue").unwrap(), r#"{"paused":false}"#);
    assert!(!control.is_paused());
}

#[test]
fn test_pause_from_another_thread() {
    let engine = Rc::new(SerialEngine::new());
    let control = engine.run_control();
    control.pause();

    let resumer = {
        let control = control.clone();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            control.resume();
        })
    };

    // Blocks until the other thread resumes.
    engine.run();
    resumer.join().unwrap();
    assert!(!control.is_paused());
}

#[test]
fn test_tick_route_wakes_component() {
    let sys = system();
    let body = sys.monitor.handle("/api/tick/Mem").unwrap();
    assert_eq!(body, r#"{"ticked":"Mem"}"#);

    sys.engine.run();
    assert_eq!(sys.engine.current_time(), 1);
    let now: serde_json::Value = serde_json::from_str(&sys.monitor.handle("/api/now").unwrap()).unwrap();
    assert_eq!(now["now"], 1);
}

#[test]
fn test_run_route_drives_engine() {
    let sys = system();
    sys.monitor.handle("/api/tick/L1").unwrap();
    assert_eq!(sys.engine.pending_events(), 1);

    let body = sys.monitor.handle("/api/run").unwrap();
    assert_eq!(body, r#"{"now":1}"#);
    assert_eq!(sys.engine.pending_events(), 0);
    assert_eq!(sys.monitor.now(), 1);
}

#[test]
fn test_agents_are_inspectable() {
    let engine = Rc::new(SerialEngine::new());
    let conn = DirectConnection::<SampleMsg>::builder(engine.clone()).build("Conn");
    let a = TrafficAgent::build("A", engine.clone(), Freq::new(1), 4);
    let b = TrafficAgent::build("B", engine.clone(), Freq::new(1), 4);
    let pa = a.borrow().inner().port().clone();
    let pb = b.borrow().inner().port().clone();
    conn.borrow_mut().plug_in(pa.clone(), 1);
    conn.borrow_mut().plug_in(pb.clone(), 1);
    for i in 0..5 {
        a.borrow_mut()
            .inner_mut()
            .enqueue(SampleMsg::routed(format!("m{i}"), pa.id(), pb.id(), 0));
    }

    let mut monitor = Monitor::new(engine.clone(), engine.run_control());
    monitor.register_component(&a);
    monitor.register_component(&b);
    monitor.register_connection(&conn);

    assert_eq!(monitor.field("A", "pending").unwrap(), 5);
    monitor.tick("A").unwrap();
    engine.run();

    assert_eq!(monitor.field("A", "pending").unwrap(), 0);
    assert_eq!(monitor.field("B", "stats.received").unwrap(), 5);
    assert_eq!(monitor.field("Conn", "stats.msgs_delivered").unwrap(), 5);
}
