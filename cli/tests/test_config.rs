use std::io::Write;

use anvil::cfg::{Config, FlashOperation};
use anvil_flash::mac::FlashMethod;

fn load(yaml: &str) -> Result<Config, anvil::AnvilError> {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    Config::load(file.path())
}

const FULL: &str = r#"
system:
  product: Widget X1
  manufacturer: ACME
  requireRoot: false
  guidPrefix: 1b4e28ba-2fa1-11d2-883f-b9a761bde3fb
tests:
  timeout: 60
  parallelGroups:
    - - name: disk
        command: smartctl
        args: ["-H", "/dev/sda"]
      - name: fan
        command: check-fans
        required: false
  sequentialGroups:
    - - name: memory
        command: memtester
        timeout: 1200
        collapseOutputOnSuccess: true
flash:
  enabled: true
  operations: [mac, efi, fru]
  fields:
    - name: serial
      prompt: "Scan the serial label:"
      regex: "[A-Z]{2}[0-9]{6}"
    - name: mac
      prompt: "Scan the MAC label:"
      regex: "([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}"
  method: vendor-multi-nic
  venDevice: ["10ec:8168"]
  benignExitCodes: [2, 77]
log:
  sendLogs: true
  server: logs@station-7
  opName: line-3
"#;

#[test]
fn test_full_config_parses() {
    let config = load(FULL).unwrap();

    assert_eq!(config.system.product, "Widget X1");
    assert!(!config.system.require_root);

    assert_eq!(config.tests.timeout, 60);
    assert_eq!(config.tests.parallel_groups.len(), 1);
    assert_eq!(config.tests.parallel_groups[0].len(), 2);
    let fan = &config.tests.parallel_groups[0][1];
    assert!(!fan.required);
    assert!(fan.args.is_empty());
    let memory = &config.tests.sequential_groups[0][0];
    assert_eq!(memory.timeout, Some(1200));
    assert!(memory.collapse_output_on_success);

    assert!(config.flash.enabled);
    assert_eq!(
        config.flash.operations,
        vec![FlashOperation::Mac, FlashOperation::Efi, FlashOperation::Fru]
    );
    assert_eq!(config.flash.method, FlashMethod::VendorMultiNic);
    assert_eq!(config.flash.benign_exit_codes, vec![2, 77]);

    assert!(config.log.send_logs);
    assert_eq!(config.log.server.as_deref(), Some("logs@station-7"));
    assert_eq!(config.log.op_name, "line-3");
}

#[test]
fn test_minimal_config_gets_defaults() {
    let config = load(
        "system:\n  product: Widget X1\n  manufacturer: ACME\n  guidPrefix: 1b4e28ba-2fa1-11d2-883f-b9a761bde3fb\n",
    )
    .unwrap();

    assert!(config.system.require_root);
    assert_eq!(config.tests.timeout, 300);
    assert!(config.tests.parallel_groups.is_empty());
    assert!(!config.flash.enabled);
    assert_eq!(config.flash.method, FlashMethod::DriverSwap);
    assert_eq!(config.flash.normal_driver, "r8169");
    assert_eq!(config.flash.flash_driver, "pgdrv");
    assert_eq!(config.flash.benign_exit_codes, vec![2]);
    assert!(config.log.save_local);
    assert!(!config.log.send_logs);
}

#[test]
fn test_unknown_keys_are_rejected() {
    let result = load(
        "system:\n  product: X\n  manufacturer: A\n  guidPrefix: g\n  surprise: true\n",
    );
    assert!(result.is_err());
}

#[test]
fn test_multi_nic_flashing_requires_a_device_filter() {
    let result = load(
        "system:\n  product: X\n  manufacturer: A\n  guidPrefix: g\nflash:\n  enabled: true\n  method: vendor-multi-nic\n",
    );
    assert!(result.is_err());
}

#[test]
fn test_bad_field_pattern_is_rejected() {
    let result = load(
        "system:\n  product: X\n  manufacturer: A\n  guidPrefix: g\nflash:\n  enabled: true\n  fields:\n    - name: serial\n      prompt: p\n      regex: '['\n",
    );
    assert!(result.is_err());
}

#[test]
fn test_missing_file_is_a_config_error() {
    let result = Config::load(std::path::Path::new("/nonexistent/anvil.yaml"));
    assert!(matches!(result, Err(anvil::AnvilError::Config(_))));
}
