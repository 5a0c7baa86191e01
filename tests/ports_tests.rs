use host_scan_rs::ports::{default_ports, load_ports_from_path, parse_port_spec};
use std::fs;

#[test]
fn spec_examples() {
    assert_eq!(parse_port_spec(Some("80,443")), vec![80, 443]);
    assert_eq!(parse_port_spec(Some("1-3")), vec![1, 2, 3]);
    assert!(parse_port_spec(Some("5-3")).is_empty());
    assert_eq!(parse_port_spec(Some("abc,22")), vec![22]);
    assert_eq!(parse_port_spec(Some("")), default_ports());
    assert_eq!(parse_port_spec(None).len(), 20);
}

#[test]
fn output_is_unique_ascending_and_in_range() {
    let specs = [
        "1-10,5-15,10",
        "65530-65535,65535,0,-1,99999",
        "443,80,443,22-25,24",
        "  7 , 7-7 ,, x ",
    ];
    for spec in specs {
        let ports = parse_port_spec(Some(spec));
        assert!(ports.windows(2).all(|w| w[0] < w[1]), "{spec}: {ports:?}");
        assert!(ports.iter().all(|&p| p >= 1), "{spec}: {ports:?}");
    }
}

#[test]
fn ports_file_with_comments() {
    let path = std::env::temp_dir().join(format!("host-scan-ports-{}.txt", std::process::id()));
    fs::write(
        &path,
        r#"
        # common ports
        22
        80, 443  # web
        8000-8002
        8001  # duplicate
        bogus
    "#,
    )
    .unwrap();

    let ports = load_ports_from_path(&path).expect("readable file");
    fs::remove_file(&path).ok();
    assert_eq!(ports, vec![22, 80, 443, 8000, 8001, 8002]);
}

#[test]
fn ports_file_tokens_decide_between_empty_and_defaults() {
    let dir = std::env::temp_dir();
    let reversed = dir.join(format!("host-scan-reversed-{}.txt", std::process::id()));
    let comments = dir.join(format!("host-scan-comments-{}.txt", std::process::id()));
    fs::write(&reversed, "5-3\n").unwrap();
    fs::write(&comments, "# nothing to scan yet\n\n").unwrap();

    let from_reversed = load_ports_from_path(&reversed).unwrap();
    let from_comments = load_ports_from_path(&comments).unwrap();
    fs::remove_file(&reversed).ok();
    fs::remove_file(&comments).ok();

    assert!(from_reversed.is_empty());
    assert_eq!(from_comments, default_ports());
}

#[test]
fn missing_ports_file_is_an_error() {
    assert!(load_ports_from_path("/nonexistent/host-scan/ports.txt").is_err());
}
