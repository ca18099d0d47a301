use indexmap::IndexMap;
use regex::{Captures, Regex};
use tracing::warn;

/// Replaces `{name}` placeholders with the matching parameter values.
/// Placeholders without a parameter are left as written.
pub fn substitute(nrql: &str, params: &IndexMap<String, String>) -> Result<String, regex::Error> {
    let placeholder = Regex::new(r"\{([a-zA-Z]\w*)\}")?;

    let substituted = placeholder.replace_all(nrql, |captures: &Captures| {
        let name = &captures[1];
        match params.get(name) {
            Some(value) => value.to_owned(),
            None => {
                warn!("cannot find {} in parameters", name);
                captures[0].to_owned()
            }
        }
    });

    Ok(substituted.into_owned())
}
