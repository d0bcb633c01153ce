use crate::*;

/// census-ctl status / peers against a live pair.
#[test]
fn test_ctl_status_and_peers() {
    if !skip_unless_ready() {
        return;
    }
    let _lock = DAEMON_LOCK.lock().unwrap();

    let (port_a, port_b) = (free_udp_port(), free_udp_port());
    let node_a = Daemon::spawn("it-ctl", port_a, port_b, &[]).unwrap();
    let node_b = Daemon::spawn("it-ctl", port_b, port_a, &[]).unwrap();
    node_a.wait_for_peers(1, Duration::from_secs(8)).unwrap();

    let status = node_a.get("/status").unwrap();
    assert_eq!(status["protocol"].as_str(), Some("binary"));
    assert!(status["node_id"].is_string(), "missing node_id");

    let out = node_a.ctl(&["status"]).unwrap();
    assert!(out.contains("Census Daemon Status"), "status header missing: {out}");
    assert!(out.contains("Peers visible    : 1"), "peer line wrong: {out}");

    let default_out = node_a.ctl(&[]).unwrap();
    assert!(default_out.contains("Census Daemon Status"), "default cmd not status");

    let b_id = node_b.get("/status").unwrap()["node_id"]
        .as_str()
        .unwrap()
        .to_string();
    let peers_out = node_a.ctl(&["peers"]).unwrap();
    assert!(peers_out.contains(&b_id), "peer id missing: {peers_out}");

    let raw = node_a.ctl(&["--json", "peers"]).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed["peers"].as_array().map(|p| p.len()), Some(1));
}
