//! Shared helpers for bundle integration tests.

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

pub const PASSWORD_ENV: &str = "SCRIPTPACK_PASSWORD";

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Write an executable script into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).expect("write script");
    let mut perms = fs::metadata(&path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod script");
    path
}

/// The speak/moo scripts used across scenarios.
pub struct Scripts {
    pub speak: PathBuf,
    pub moo: PathBuf,
}

pub fn write_demo_scripts(dir: &Path) -> Scripts {
    let speak = write_script(
        dir,
        "speak.sh",
        "#!/usr/bin/env bash\nprintf '%s says: %s\\n' \"$0\" \"$*\"\n",
    );
    let moo = write_script(
        dir,
        "moo.sh",
        "#!/usr/bin/env bash\necho moo\nexit 3\n",
    );
    Scripts { speak, moo }
}

pub fn command_list(pairs: &[(&str, &Path)]) -> String {
    pairs
        .iter()
        .map(|(name, path)| format!("{name}:{}", path.display()))
        .collect::<Vec<_>>()
        .join(",")
}

/// A scriptpack invocation with a scrubbed password environment and no stdin.
pub fn scriptpack() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_scriptpack"));
    command
        .env_remove(PASSWORD_ENV)
        .env_remove("SCRIPTPACK_LOG")
        .stdin(Stdio::null());
    command
}

pub fn build(pairs: &[(&str, &Path)], output: &Path, extra: &[&str]) -> Output {
    scriptpack()
        .arg("build")
        .arg("--commands")
        .arg(command_list(pairs))
        .arg("--output")
        .arg(output)
        .args(extra)
        .output()
        .expect("run scriptpack build")
}

/// Build a bundle encrypted with `password`, answering the prompt from the env.
pub fn build_protected(pairs: &[(&str, &Path)], output: &Path, password: &str) -> Output {
    scriptpack()
        .arg("build")
        .arg("--commands")
        .arg(command_list(pairs))
        .arg("--output")
        .arg(output)
        .arg("--password")
        .env(PASSWORD_ENV, password)
        .output()
        .expect("run scriptpack build --password")
}

/// Run `command` with `input` on its stdin and collect its output.
pub fn output_with_input(mut command: Command, input: &[u8]) -> Output {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn command");
    let mut stdin = child.stdin.take().expect("child stdin");
    stdin.write_all(input).expect("write child stdin");
    drop(stdin);
    child.wait_with_output().expect("wait for command")
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

pub fn bash_and_unzip_available() -> bool {
    find_in_path("bash").is_some() && find_in_path("unzip").is_some()
}
