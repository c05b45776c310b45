use std::str::FromStr;

use anvil_flash::netinv::{self, snapshot_from};
use mac_address::MacAddress;

/// Builds a minimal sysfs-style interface tree under a temp dir.
fn fake_interface(root: &std::path::Path, name: &str, mac: &str, driver: Option<&str>) {
    let base = root.join(name);
    std::fs::create_dir_all(&base).unwrap();
    std::fs::write(base.join("address"), format!("{mac}\n")).unwrap();
    std::fs::write(base.join("operstate"), "up\n").unwrap();
    if let Some(driver) = driver {
        // The driver name is derived from the symlink target's last
        // path component, exactly as sysfs lays it out.
        let target = base.join("device").join(driver);
        std::fs::create_dir_all(&target).unwrap();
        std::os::unix::fs::symlink(&target, base.join("device/driver")).unwrap();
    }
}

#[tokio::test]
async fn test_snapshot_reads_mac_state_and_driver() {
    let dir = tempfile::tempdir().unwrap();
    fake_interface(dir.path(), "eth0", "aa:bb:cc:dd:ee:01", Some("r8169"));

    let interfaces = snapshot_from(dir.path()).await.unwrap();
    let eth0 = netinv::find_by_name(&interfaces, "eth0").unwrap();
    assert_eq!(
        eth0.mac,
        Some(MacAddress::from_str("aa:bb:cc:dd:ee:01").unwrap())
    );
    assert_eq!(eth0.state, "up");
    assert_eq!(eth0.driver.as_deref(), Some("r8169"));
}

#[tokio::test]
async fn test_snapshot_skips_loopback() {
    let dir = tempfile::tempdir().unwrap();
    fake_interface(dir.path(), "lo", "00:00:00:00:00:00", None);
    fake_interface(dir.path(), "eth0", "aa:bb:cc:dd:ee:01", None);

    let interfaces = snapshot_from(dir.path()).await.unwrap();
    assert!(netinv::find_by_name(&interfaces, "lo").is_none());
    assert!(netinv::find_by_name(&interfaces, "eth0").is_some());
}

#[tokio::test]
async fn test_lookups_by_mac_and_driver() {
    let dir = tempfile::tempdir().unwrap();
    fake_interface(dir.path(), "eth0", "aa:bb:cc:dd:ee:01", Some("r8169"));
    fake_interface(dir.path(), "eth1", "aa:bb:cc:dd:ee:02", Some("e1000e"));

    let interfaces = snapshot_from(dir.path()).await.unwrap();
    let mac = MacAddress::from_str("aa:bb:cc:dd:ee:02").unwrap();
    assert_eq!(
        netinv::find_by_mac(&interfaces, &mac).map(|i| i.name.as_str()),
        Some("eth1")
    );
    assert_eq!(
        netinv::find_by_driver(&interfaces, "r8169").map(|i| i.name.as_str()),
        Some("eth0")
    );
    assert!(netinv::find_by_driver(&interfaces, "igb").is_none());
}
