//! Final command construction.
//!
//! Pure and stateless: combine a base command with environment pairs into a
//! single shell-executable string.

/// Render `env` pairs as `export` lines ahead of `command`.
///
/// With no pairs the base command is returned unchanged. Otherwise each pair
/// becomes `export NAME='VALUE'` on its own line, in the order given,
/// followed by the base command, all joined with newlines:
///
/// ```
/// use hostbox::machine::command::with_env;
///
/// let pairs = vec![("RAILS_ENV".to_string(), "production".to_string())];
/// assert_eq!(
///     with_env("rake db:migrate", &pairs),
///     "export RAILS_ENV='production'\nrake db:migrate"
/// );
/// ```
///
/// Values are single-quote wrapped and embedded single quotes are **not**
/// escaped. This matches the historical wire format and is kept verbatim for
/// compatibility; callers injecting untrusted values must sanitize them
/// first.
pub fn with_env(command: &str, env: &[(String, String)]) -> String {
    if env.is_empty() {
        return command.to_string();
    }

    let mut lines: Vec<String> = env
        .iter()
        .map(|(name, value)| format!("export {name}='{value}'"))
        .collect();
    lines.push(command.to_string());
    lines.join("\n")
}
