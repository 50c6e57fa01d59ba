//! Map resolution and coherency through the connection manager.

mod common;

use common::{ai, dio, local_config, registry, AI_MODEL, DIO_MODEL};
use daq_driver_iom::{ConnectionManager, IomError, ManagerState, SimulatedChassis};

fn map(name: &str, class: &str, extra: &str) -> String {
    format!(
        r#"
[[maps]]
name = "{name}"
class = "{class}"
scan_rate_hz = 100.0
{extra}
"#
    )
}

fn chassis() -> SimulatedChassis {
    SimulatedChassis::new()
        .with_slot(0, DIO_MODEL)
        .with_slot(1, AI_MODEL)
}

fn run(entries: &[String]) -> (ConnectionManager, SimulatedChassis, Result<(), IomError>) {
    let chassis = chassis();
    let mut manager = ConnectionManager::new(Box::new(chassis.clone()));
    let result = manager.initialise(&local_config(entries), &registry());
    (manager, chassis, result)
}

#[test]
fn test_maps_over_two_devices() {
    let (manager, _, result) = run(&[
        dio("dio0", 0),
        ai("ai1", 1),
        map(
            "mixed",
            "point",
            r#"inputs = [{ device = "dio0", channels = [0, 1] }, { device = "ai1", channels = [0, 7] }]"#,
        ),
    ]);
    result.expect("initialise");
    let mixed = manager.map("mixed").expect("map");
    assert!(mixed.is_coherent());
    assert_eq!(mixed.groups().len(), 2);
    assert!(mixed.groups().iter().all(|g| g.device().is_some()));
}

#[test]
fn test_unresolved_device_fails() {
    let (manager, chassis, result) = run(&[
        dio("dio0", 0),
        map("m", "point", r#"inputs = [{ device = "dio9", channels = [0] }]"#),
    ]);
    match result {
        Err(IomError::UnresolvedDevice { map, device }) => {
            assert_eq!(map, "m");
            assert_eq!(device, "dio9");
        }
        other => panic!("expected unresolved device, got {other:?}"),
    }
    assert_eq!(manager.state(), ManagerState::Failed);
    assert!(manager.maps().is_empty());
    assert!(chassis.open_handles().is_empty());
}

#[test]
fn test_forced_incoherency_rejected() {
    let (manager, _, result) = run(&[
        dio("dio0", 0),
        map("bad", "incoherent", r#"inputs = [{ device = "dio0", channels = [0] }]"#),
    ]);
    match result {
        Err(IomError::IncoherentMap { map, reason }) => {
            assert_eq!(map, "bad");
            assert_eq!(reason, "forced failure");
        }
        other => panic!("expected incoherent map, got {other:?}"),
    }
    assert_eq!(manager.state(), ManagerState::Failed);
}

#[test]
fn test_invalid_channel_in_map() {
    let (_, _, result) = run(&[
        dio("dio0", 0),
        map("m", "point", r#"outputs = [{ device = "dio0", channels = [12] }]"#),
    ]);
    assert!(matches!(result, Err(IomError::IncoherentMap { .. })));

    let (_, _, result) = run(&[
        ai("ai1", 1),
        map("m", "point", r#"outputs = [{ device = "ai1", channels = [0] }]"#),
    ]);
    assert!(matches!(result, Err(IomError::IncoherentMap { .. })));
}

#[test]
fn test_direction_claimed_by_two_maps() {
    let (_, _, result) = run(&[
        dio("dio0", 0),
        map("a", "point", r#"inputs = [{ device = "dio0", channels = [0] }]"#),
        map("b", "point", r#"inputs = [{ device = "dio0", channels = [1] }]"#),
    ]);
    match result {
        Err(IomError::IncoherentMap { map, reason }) => {
            assert_eq!(map, "b");
            assert!(reason.contains("already driven by map 'a'"), "{reason}");
        }
        other => panic!("expected exclusivity failure, got {other:?}"),
    }

    // Different directions of one board may belong to different maps.
    let (_, _, result) = run(&[
        dio("dio0", 0),
        map("a", "point", r#"inputs = [{ device = "dio0", channels = [0] }]"#),
        map("b", "point", r#"outputs = [{ device = "dio0", channels = [0] }]"#),
    ]);
    result.expect("split directions");
}

#[test]
fn test_duplicate_map_name_and_unknown_class() {
    let (_, _, result) = run(&[
        dio("dio0", 0),
        map("a", "point", r#"inputs = [{ device = "dio0", channels = [0] }]"#),
        map("a", "point", r#"outputs = [{ device = "dio0", channels = [0] }]"#),
    ]);
    assert!(matches!(result, Err(IomError::InvalidConfig { .. })));

    let (_, _, result) = run(&[
        dio("dio0", 0),
        map("a", "streaming", r#"inputs = [{ device = "dio0", channels = [0] }]"#),
    ]);
    assert!(matches!(
        result,
        Err(IomError::UnknownClass { category: "map", .. })
    ));
}

#[test]
fn test_buffered_map_needs_double_buffering_on_real_time_thread() {
    let single = r#"
[[devices]]
name = "dio0"
class = "dio-404"
devn = 0
number_of_buffers = 1
samples_per_channel = 4
[devices.config]
voltage_reference = 5.0
"#
    .to_string();

    let (_, _, result) = run(&[
        single.clone(),
        map("rt", "buffered", r#"inputs = [{ device = "dio0", channels = [0] }]"#),
    ]);
    assert!(matches!(result, Err(IomError::IncoherentMap { .. })));

    let (manager, _, result) = run(&[
        single,
        map(
            "polled",
            "buffered",
            "execution_mode = \"polled\"\ninputs = [{ device = \"dio0\", channels = [0] }]",
        ),
    ]);
    result.expect("polled map");
    assert_eq!(manager.state(), ManagerState::Ready);
}
