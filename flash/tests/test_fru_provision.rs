use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anvil_flash::fru::{FruConfig, FruIdentity, FruProvisioner, FRU_BLANK_SIZE};
use anvil_utils::AutoDecisions;

fn identity() -> FruIdentity {
    FruIdentity {
        manufacturer: "ACME".to_string(),
        product: "Widget X1".to_string(),
        serial: "SN012345".to_string(),
    }
}

/// Installs a stub FRU tool. `print` runs `print_body`; `write` appends
/// the image path to `writes` and exits clean.
fn install_tool(dir: &Path, writes: &Path, print_body: &str) -> PathBuf {
    let path = dir.join("fru-tool.sh");
    let script = format!(
        "#!/bin/sh\n\
         if [ \"$2\" = \"write\" ]; then\n\
           echo \"$4\" >> '{writes}'\n\
           exit 0\n\
         fi\n\
         {print_body}\n",
        writes = writes.display()
    );
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn provisioner(tool: &Path, work_dir: &Path) -> FruProvisioner {
    let cfg = FruConfig {
        tool: tool.to_string_lossy().to_string(),
        device_id: "0".to_string(),
        work_dir: work_dir.to_path_buf(),
    };
    FruProvisioner::new(cfg, Arc::new(AutoDecisions))
}

const VALID_PRINT: &str = "\
cat <<'EOF'
 Board Mfg             : ACME
 Board Product         : Widget X1
 Board Serial          : SN012345
EOF";

#[tokio::test]
async fn test_matching_serial_skips_the_write_entirely() {
    let dir = tempfile::tempdir().unwrap();
    let writes = dir.path().join("writes.log");
    let tool = install_tool(dir.path(), &writes, VALID_PRINT);

    let summary = provisioner(&tool, dir.path()).provision(&identity()).await;

    assert!(summary.success);
    assert!(!summary.blank_initialized);
    assert_eq!(summary.attempts, 1);
    assert!(!writes.exists());
}

#[tokio::test]
async fn test_unrecognized_header_is_blanked_before_the_image_write() {
    let dir = tempfile::tempdir().unwrap();
    let writes = dir.path().join("writes.log");
    // Reads unusable until the first write lands, then valid fields.
    let print_body = format!(
        "if [ -f '{writes}' ]; then\n{VALID_PRINT}\nelse\n  echo 'Unknown FRU header'\nfi",
        writes = writes.display()
    );
    let tool = install_tool(dir.path(), &writes, &print_body);

    let summary = provisioner(&tool, dir.path()).provision(&identity()).await;

    assert!(summary.success);
    assert!(summary.blank_initialized);

    let log = fs::read_to_string(&writes).unwrap();
    let paths: Vec<&str> = log.lines().collect();
    assert_eq!(paths.len(), 2);
    assert!(paths[0].ends_with("fru-blank.bin"));
    assert!(paths[1].ends_with("fru-image.bin"));

    let blank = fs::read(dir.path().join("fru-blank.bin")).unwrap();
    assert_eq!(blank.len(), FRU_BLANK_SIZE);
    assert!(blank.iter().all(|b| *b == 0));
}

#[tokio::test]
async fn test_unexpected_chip_size_blocks_the_blanking_write() {
    let dir = tempfile::tempdir().unwrap();
    let writes = dir.path().join("writes.log");
    let tool = install_tool(
        dir.path(),
        &writes,
        "echo 'Unknown FRU header, chip size: 4096'",
    );

    let status = provisioner(&tool, dir.path()).read_status().await;
    assert!(status.needs_blank());
    assert_eq!(status.size, Some(4096));

    let summary = provisioner(&tool, dir.path()).provision(&identity()).await;
    assert!(summary.failed());
    assert!(summary.error.unwrap().contains("4096"));
    assert!(!writes.exists());
}
