//! Flag classification: one tokenised sub-command in, one flag record out.

use camino::Utf8PathBuf;
use thiserror::Error;

use offload_proto::FlagRecord;

use crate::options::{Arity, Disposition, OptionSpec, lookup};
use crate::policy::CachePolicy;

/// Broad class of a sub-command, as far as remote execution cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// A compile job the daemon can take over.
    Compile,
    /// Anything else (post-processing tools, malformed commands).
    Unknown,
}

/// Reasons a command cannot be classified.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The command has no compiler token.
    #[error("command is empty")]
    Empty,
    /// A token matched no recognised option.
    #[error("unknown argument '{0}'")]
    UnknownArgument(String),
    /// A separate-value option ended the command.
    #[error("argument '{0}' is missing its value")]
    MissingValue(String),
    /// No positional source file was present.
    #[error("command names no input file")]
    MissingInput,
    /// More than one positional source file was present.
    #[error("command names more than one input file: '{first}' and '{second}'")]
    MultipleInputs { first: String, second: String },
}

/// Classifies one tokenised sub-command into a [`FlagRecord`].
///
/// Token 0 is the reserved program-name slot and is ignored; token 1 is the
/// compiler path. Remaining tokens are walked in order: positional tokens
/// become the input, recognised options land in their structural field or in
/// the partition the option table and `policy` select, and the plugin-loader
/// flag is dropped. The record's `compiler.version` is left for the caller,
/// which knows the driver that produced the command.
pub fn process_flags(
    tokens: &[String],
    policy: &CachePolicy,
) -> Result<FlagRecord, ClassifyError> {
    let mut record = FlagRecord::default();
    record.compiler.path = tokens
        .get(1)
        .map(Utf8PathBuf::from)
        .ok_or(ClassifyError::Empty)?;

    let mut index = 2;
    while index < tokens.len() {
        let token = &tokens[index];
        index += 1;

        if !token.starts_with('-') {
            if record.input.as_str().is_empty() {
                record.input = Utf8PathBuf::from(token);
                continue;
            }
            return Err(ClassifyError::MultipleInputs {
                first: record.input.to_string(),
                second: token.clone(),
            });
        }

        let Some(spec) = lookup(token) else {
            return Err(ClassifyError::UnknownArgument(token.clone()));
        };
        let value = match spec.arity {
            Arity::Separate => {
                let Some(value) = tokens.get(index) else {
                    return Err(ClassifyError::MissingValue(token.clone()));
                };
                index += 1;
                Some(value.as_str())
            }
            Arity::Bare | Arity::Joined => None,
        };
        apply(spec, token, value, policy, &mut record)?;
    }

    if record.input.as_str().is_empty() {
        return Err(ClassifyError::MissingInput);
    }
    Ok(record)
}

/// Classifies a command, mapping any classification failure to
/// [`CommandClass::Unknown`].
#[must_use]
pub fn command_class(tokens: &[String], policy: &CachePolicy) -> CommandClass {
    match process_flags(tokens, policy) {
        Ok(_) => CommandClass::Compile,
        Err(_) => CommandClass::Unknown,
    }
}

fn apply(
    spec: &'static OptionSpec,
    token: &str,
    value: Option<&str>,
    policy: &CachePolicy,
    record: &mut FlagRecord,
) -> Result<(), ClassifyError> {
    let missing = || ClassifyError::MissingValue(spec.spelling.to_owned());
    match spec.disposition {
        Disposition::Action => record.action = Some(spec.spelling.to_owned()),
        Disposition::Output => {
            record.output = Some(Utf8PathBuf::from(value.ok_or_else(missing)?));
        }
        Disposition::Language => record.language = Some(value.ok_or_else(missing)?.to_owned()),
        Disposition::DepsFile => {
            record.deps_file = Some(Utf8PathBuf::from(value.ok_or_else(missing)?));
        }
        Disposition::CcOnly => record.cc_only.push(spec.spelling.to_owned()),
        Disposition::Plugin => {
            let name = value.ok_or_else(missing)?;
            record.other.push(spec.spelling.to_owned());
            record.other.push(name.to_owned());
            record.compiler.plugins.push(name.to_owned());
        }
        // Dropped together with the library path it names.
        Disposition::PluginLoader => {}
        Disposition::PassThrough => {
            let bucket = if policy.is_non_cached(spec.spelling) {
                &mut record.non_cached
            } else {
                &mut record.other
            };
            render(spec, token, value, bucket);
        }
    }
    Ok(())
}

/// Appends an option in its canonical textual form, preserving the driver's
/// formatting: joined options stay one token, separate values stay split.
fn render(spec: &OptionSpec, token: &str, value: Option<&str>, bucket: &mut Vec<String>) {
    match spec.arity {
        Arity::Joined => bucket.push(token.to_owned()),
        Arity::Bare => bucket.push(spec.spelling.to_owned()),
        Arity::Separate => {
            bucket.push(spec.spelling.to_owned());
            if let Some(value) = value {
                bucket.push(value.to_owned());
            }
        }
    }
}
