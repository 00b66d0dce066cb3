//! Role name derivation from repository names

/// Organization token stripped from the front of repository names
pub const ORGANIZATION_TOKEN: &str = "ansible";

/// Token marking a repository as a role
const ROLE_TOKEN: &str = "role";

/// Separators that may follow a stripped token
const SEPARATORS: &[char] = &['-', '_', '.', '+'];

/// Upper bound on repeated tokens of one kind
const MAX_REPEATED_TOKENS: usize = 8;

/// Derive the proposed role name for a repository.
///
/// Strips leading organization tokens, then leading role tokens (each
/// optionally followed by separators), then one residual leading hyphen.
/// A name equal to the organization token, or one that would strip down to
/// nothing, is returned unchanged.
pub fn derive_role_name(repo_name: &str) -> String {
    if repo_name == ORGANIZATION_TOKEN {
        return repo_name.to_string();
    }

    let rest = strip_repeated(repo_name, ORGANIZATION_TOKEN);
    let rest = strip_repeated(rest, ROLE_TOKEN);
    let rest = rest.strip_prefix('-').unwrap_or(rest);

    if rest.is_empty() {
        repo_name.to_string()
    } else {
        rest.to_string()
    }
}

/// Strip up to `MAX_REPEATED_TOKENS` leading copies of `token`. A token
/// matches as a plain prefix, with or without a separator after it, so
/// `rolesmith` loses its `role`.
fn strip_repeated<'a>(mut name: &'a str, token: &str) -> &'a str {
    for _ in 0..MAX_REPEATED_TOKENS {
        match name.strip_prefix(token) {
            Some(rest) => name = rest.trim_start_matches(SEPARATORS),
            None => break,
        }
    }
    name
}
