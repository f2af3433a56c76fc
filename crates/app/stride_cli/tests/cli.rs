use assert_cmd::Command;
use predicates::prelude::*;

fn stride() -> Command {
    let mut cmd = Command::cargo_bin("stride_cli").unwrap();
    cmd.env("RUST_LOG", "off");
    cmd
}

#[test]
fn version_prints_package_version() {
    stride()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn help_lists_auth_commands() {
    stride()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("oauth-login")
                .and(predicate::str::contains("reset-password"))
                .and(predicate::str::contains("--database-url")),
        );
}

#[test]
fn whoami_rejects_garbage_token() {
    stride()
        .args(["whoami", "--access-token", "not-a-jwt"])
        .env("JWT_ACCESS_SECRET", "cli-test-access")
        .env("JWT_REFRESH_SECRET", "cli-test-refresh")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("error: Invalid or expired token"));
}

#[test]
fn unknown_subcommand_fails() {
    stride().arg("frobnicate").assert().failure();
}
