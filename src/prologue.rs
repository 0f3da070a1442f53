//! Embedded bash runtime written at byte 0 of every bundle.
//!
//! The prologue is fixed text; a build only freezes the protection flag into
//! it. Everything it needs to know about commands comes from the manifest
//! member. The prologue must end with `exit` so bash never reads into the
//! archive bytes that follow.
use crate::manifest::{DISPATCH_ROUTINE, MANIFEST_MEMBER, REGISTER_ROUTINE};

/// Credential consumed by a protected bundle.
pub const PASSWORD_ENV: &str = "SCRIPTPACK_PASSWORD";
/// Absolute path of the running bundle, for recursive dispatch.
pub const SELF_ENV: &str = "SCRIPTPACK_SELF";
/// Runtime primitive available to hosted scripts.
pub const EXECUTE_FUNCTION: &str = "execute_bundled_script";
/// Interpreter that runs hosted scripts.
pub const INTERPRETER: &str = "bash";

const CHECK_FUNCTION: &str = "scriptpack_check_member";
const PROTECTED_KEY: &str = "SCRIPTPACK_PROTECTED=";

// Verifies a member (decrypting it when needed) without emitting its bytes.
// unzip exits 11 when no member matched and 82 when every match failed the
// password check.
const CHECK_BODY: &str = r#"{
  local scriptpack_status=0
  unzip -tqq -P "${SCRIPTPACK_PASSWORD:-}" "$SCRIPTPACK_SELF" "$1" >/dev/null 2>&1 || scriptpack_status=$?
  case "$scriptpack_status" in
    0) return 0 ;;
    11) printf 'Bundled script not found: %s\n' "$1" >&2 ;;
    82)
      if [ -n "${SCRIPTPACK_PASSWORD:-}" ]; then
        printf 'Invalid password\n' >&2
      else
        printf 'Password required but not provided\n' >&2
      fi
      ;;
    *) printf 'Failed to read %s from %s (unzip exit %s): corrupt bundle or invalid password\n' "$1" "$SCRIPTPACK_SELF" "$scriptpack_status" >&2 ;;
  esac
  return 1
}"#;

const EXECUTE_BODY: &str = r#"{
  local scriptpack_member="$1"
  shift
  if [ -z "${SCRIPTPACK_SELF:-}" ]; then
    printf 'execute_bundled_script: SCRIPTPACK_SELF is not set\n' >&2
    return 1
  fi
  scriptpack_check_member "$scriptpack_member" || return 1
  local scriptpack_name="${scriptpack_member##*/}" scriptpack_script
  scriptpack_script=$(unzip -p -P "${SCRIPTPACK_PASSWORD:-}" "$SCRIPTPACK_SELF" "$scriptpack_member") \
    || { printf 'Failed to read %s from %s\n' "$scriptpack_member" "$SCRIPTPACK_SELF" >&2; return 1; }
  (exec -a "$scriptpack_name" bash -c "$scriptpack_script" "$scriptpack_name" "$@")
}"#;

const RUNTIME: &str = r#"
scriptpack_fail() {
  printf '%s\n' "$*" >&2
  exit 1
}

scriptpack_resolve_self() {
  local target="$1" dir
  while [ -L "$target" ]; do
    dir=$(cd -P -- "$(dirname -- "$target")" && pwd) || return 1
    target=$(readlink -- "$target") || return 1
    case "$target" in
      /*) ;;
      *) target="$dir/$target" ;;
    esac
  done
  dir=$(cd -P -- "$(dirname -- "$target")" && pwd) || return 1
  printf '%s/%s\n' "$dir" "${target##*/}"
}

scriptpack_commands=()
scriptpack_members=()

scriptpack_decode() {
  printf '%b' "${1//%/\\x}"
}

@REGISTER@() {
  scriptpack_commands+=("$(scriptpack_decode "$1")")
  scriptpack_members+=("$(scriptpack_decode "$2")")
}

scriptpack_usage() {
  local name
  printf 'Usage: %s <command> [args...]\n\nAvailable commands:\n' "${0##*/}" >&2
  for name in "${scriptpack_commands[@]}"; do
    printf '  %s\n' "$name" >&2
  done
}

@DISPATCH@() {
  local i
  if [ "$#" -eq 0 ]; then
    scriptpack_usage
    exit 1
  fi
  for i in "${!scriptpack_commands[@]}"; do
    if [ "${scriptpack_commands[$i]}" = "$1" ]; then
      shift
      @EXECUTE@ "${scriptpack_members[$i]}" "$@"
      exit $?
    fi
  done
  printf 'Invalid command: %s\n' "$1" >&2
  scriptpack_usage
  exit 1
}

SCRIPTPACK_SELF=$(scriptpack_resolve_self "${BASH_SOURCE[0]}") \
  || scriptpack_fail "scriptpack: cannot resolve bundle path ${BASH_SOURCE[0]}"
export SCRIPTPACK_SELF

command -v unzip >/dev/null 2>&1 \
  || scriptpack_fail "scriptpack: unzip is required to run this bundle but was not found in PATH"

if [ "$SCRIPTPACK_PROTECTED" = 1 ] && [ -z "${SCRIPTPACK_PASSWORD:-}" ]; then
  [ -t 0 ] || scriptpack_fail "Password required but not provided (set SCRIPTPACK_PASSWORD)"
  IFS= read -r -s -p "Password: " SCRIPTPACK_PASSWORD
  printf '\n' >&2
  [ -n "$SCRIPTPACK_PASSWORD" ] || scriptpack_fail "Password required but not provided"
fi
export SCRIPTPACK_PASSWORD

scriptpack_check_member "$SCRIPTPACK_MANIFEST" || exit 1
scriptpack_manifest=$(unzip -p -P "${SCRIPTPACK_PASSWORD:-}" "$SCRIPTPACK_SELF" "$SCRIPTPACK_MANIFEST") \
  || scriptpack_fail "scriptpack: cannot read the bundle manifest"
eval "$scriptpack_manifest"
exit 1
"#;

/// Render the prologue with the protection flag frozen in.
pub fn render(protected: bool) -> String {
    let mut out = String::new();
    out.push_str("#!/usr/bin/env bash\n");
    out.push_str("# Bundle generated by scriptpack. A zip archive follows this script;\n");
    out.push_str("# run it with a command name, or open it with any zip tool.\n");
    out.push_str(&format!("{PROTECTED_KEY}{}\n", u8::from(protected)));
    out.push_str(&format!("SCRIPTPACK_MANIFEST='{MANIFEST_MEMBER}'\n\n"));
    out.push_str(&format!("{CHECK_FUNCTION}() {CHECK_BODY}\n\n"));
    out.push_str(&format!("{EXECUTE_FUNCTION}() {EXECUTE_BODY}\n\n"));
    out.push_str(&format!("export -f {CHECK_FUNCTION} {EXECUTE_FUNCTION}\n"));
    out.push_str(
        &RUNTIME
            .replace("@REGISTER@", REGISTER_ROUTINE)
            .replace("@DISPATCH@", DISPATCH_ROUTINE)
            .replace("@EXECUTE@", EXECUTE_FUNCTION),
    );
    out
}

/// Read the frozen protection flag back out of a prologue.
pub fn parse_protected(prologue: &[u8]) -> Option<bool> {
    let text = String::from_utf8_lossy(prologue);
    text.lines()
        .find_map(|line| line.strip_prefix(PROTECTED_KEY))
        .and_then(|value| match value.trim() {
            "1" => Some(true),
            "0" => Some(false),
            _ => None,
        })
}

/// Runtime functions in bash's exported-function environment encoding.
///
/// A hosted script started outside the prologue receives these so
/// `execute_bundled_script` behaves the same as under the prologue.
pub fn exported_functions() -> Vec<(String, String)> {
    [(CHECK_FUNCTION, CHECK_BODY), (EXECUTE_FUNCTION, EXECUTE_BODY)]
        .into_iter()
        .map(|(name, body)| (format!("BASH_FUNC_{name}%%"), format!("() {body}")))
        .collect()
}
