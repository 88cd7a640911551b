//! Integration tests: cli.
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// Temporary working directory holding a manifest
struct TestContext {
    temp_dir: TempDir,
    bom: PathBuf,
}

impl TestContext {
    fn new(manifest: &str) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let bom = temp_dir.path().join("bom.yml");
        std::fs::write(&bom, manifest).expect("failed to write bom");
        Self { temp_dir, bom }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_bom-mgmt"));
        cmd.current_dir(self.temp_dir.path());
        for var in [
            "MINIO_BOM",
            "MINIO_BITS_DIR",
            "MINIO_HOST",
            "MINIO_ACCESS_KEY",
            "MINIO_SECRET",
            "MINIO_BUCKET",
            "MINIO_SECURE",
            "MINIO_REGION",
        ] {
            cmd.env_remove(var);
        }
        cmd
    }
}

const MANIFEST: &str = r"
bits:
  - name: jq-linux64
    resourceType: file
    url: https://example.com/jq-linux64
  - name: concourse-pipelines.tgz
    resourceType: git
    gitRepo: https://github.com/pivotalservices/concourse-pipelines
    branch: master
";

#[test]
fn test_help_lists_subcommands() {
    let ctx = TestContext::new(MANIFEST);
    let output = ctx.cmd().arg("--help").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for sub in ["download-bits", "upload-bits", "generate-resources", "version"] {
        assert!(stdout.contains(sub), "missing {sub} in:\n{stdout}");
    }
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new(MANIFEST);
    let output = ctx.cmd().arg("version").output().expect("failed to run");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("bom-mgmt "));
}

#[test]
fn test_generate_resources_from_env() {
    let ctx = TestContext::new(MANIFEST);
    let output = ctx
        .cmd()
        .arg("generate-resources")
        .env("MINIO_BOM", &ctx.bom)
        .env("MINIO_HOST", "minio.local:9000")
        .env("MINIO_ACCESS_KEY", "minio")
        .env("MINIO_SECRET", "minio123")
        .env("MINIO_BUCKET", "bits")
        .output()
        .expect("failed to run");

    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("name: jq-linux64"));
    assert!(stdout.contains("name: concourse-pipelines\n"));
    assert!(stdout.contains("regexp: resources/git/concourse-pipelines.tgz"));
    assert!(stdout.contains("endpoint: http://minio.local:9000"));
}

#[test]
fn test_invalid_manifest_fails_download() {
    let ctx = TestContext::new("bits:\n  - name: a\n    resourceType: helm\n");
    let bits = ctx.temp_dir.path().join("bits");
    let output = ctx
        .cmd()
        .arg("download-bits")
        .arg("--bom")
        .arg(&ctx.bom)
        .arg("--bits")
        .arg(&bits)
        .output()
        .expect("failed to run");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("helm"));
    assert!(!bits.exists());
}

#[test]
fn test_upload_precheck_fails_without_bits() {
    let ctx = TestContext::new(MANIFEST);
    let output = ctx
        .cmd()
        .args(["upload-bits", "--host", "127.0.0.1:1", "--key", "k"])
        .args(["--secret", "s", "--bucket", "bits"])
        .arg("--bom")
        .arg(&ctx.bom)
        .arg("--bits")
        .arg(ctx.temp_dir.path().join("bits"))
        .output()
        .expect("failed to run");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("is not present"));
}

#[test]
fn test_generate_resources_does_not_need_download_secrets() {
    let ctx = TestContext::new(
        r"
bits:
  - name: p-mysql.pivotal
    resourceType: pivnet-tile
    productSlug: p-mysql
    version: '2.5.0'
  - name: VMware-ovftool.bundle
    resourceType: vmware
",
    );
    let output = ctx
        .cmd()
        .args(["generate-resources", "--host", "minio.local:9000", "--key", "k"])
        .args(["--secret", "s", "--bucket", "bits"])
        .arg("--bom")
        .arg(&ctx.bom)
        .output()
        .expect("failed to run");

    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("regexp: resources/pivnet-tile/p-mysql-tarball/p-mysql.pivotal"));
    assert!(stdout.contains("regexp: resources/vmware/VMware-ovftool.bundle"));
}
