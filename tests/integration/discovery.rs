use crate::*;

/// Two daemons in one group see each other, and the survivor forgets the
/// other once it stops beaconing.
#[test]
fn test_pair_discovers_then_ages_out() {
    if !skip_unless_ready() {
        return;
    }
    let _lock = DAEMON_LOCK.lock().unwrap();

    let (port_a, port_b) = (free_udp_port(), free_udp_port());
    let node_a = Daemon::spawn("it-lab", port_a, port_b, &[]).unwrap();
    let mut node_b = Daemon::spawn("it-lab", port_b, port_a, &[]).unwrap();

    node_a.wait_for_peers(1, Duration::from_secs(8)).unwrap();
    node_b.wait_for_peers(1, Duration::from_secs(8)).unwrap();

    let status = node_a.get("/status").unwrap();
    assert_eq!(status["interval_secs"].as_u64(), Some(2));

    // one entry left: gone after ~6s without a beacon
    node_b.kill();
    node_a.wait_for_peers(0, Duration::from_secs(12)).unwrap();
}

/// Daemons in different groups never count each other.
#[test]
fn test_groups_are_isolated() {
    if !skip_unless_ready() {
        return;
    }
    let _lock = DAEMON_LOCK.lock().unwrap();

    let (port_a, port_b) = (free_udp_port(), free_udp_port());
    let node_a = Daemon::spawn("it-red", port_a, port_b, &[]).unwrap();
    let node_b = Daemon::spawn("it-blue", port_b, port_a, &[]).unwrap();

    thread::sleep(Duration::from_secs(4));
    assert_eq!(node_a.peers().unwrap(), 0);
    assert_eq!(node_b.peers().unwrap(), 0);
}

/// Text-protocol daemons find each other too.
#[test]
fn test_text_protocol_pair() {
    if !skip_unless_ready() {
        return;
    }
    let _lock = DAEMON_LOCK.lock().unwrap();

    let env = [("CENSUS_SWARM__PROTOCOL", "text")];
    let (port_a, port_b) = (free_udp_port(), free_udp_port());
    let node_a = Daemon::spawn("it-text", port_a, port_b, &env).unwrap();
    let node_b = Daemon::spawn("it-text", port_b, port_a, &env).unwrap();

    node_a.wait_for_peers(1, Duration::from_secs(8)).unwrap();
    node_b.wait_for_peers(1, Duration::from_secs(8)).unwrap();

    let peers = node_a.get("/peers").unwrap();
    let id = peers["peers"][0]["node_id"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 32);
    assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    assert_eq!(node_b.get("/status").unwrap()["node_id"].as_str(), Some(id.as_str()));
}
