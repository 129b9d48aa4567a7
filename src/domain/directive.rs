//! The semicolon-delimited directive format carried in payment metadata.
//!
//! A payment's metadata looks like `alice@soak.kst;username=steve;message=gg`.
//! The first segment may address a name (optionally with a metaname before the
//! `@`); every other segment is either `key=value` or a bare value that is kept
//! under its segment index.

/// Top-level suffix recognised by the name shorthand.
pub const NAME_SUFFIX: &str = ".kst";

const MAX_METANAME_LEN: usize = 32;
const MAX_NAME_LEN: usize = 64;

/// Decoded payment metadata.
///
/// Recognised keys get their own field. Anything else, including bare
/// positional values and explicit `name=`/`metaname=`/`recipient=` pairs,
/// lands in `extra` in the order it was seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directive {
    pub metaname: Option<String>,
    pub name: Option<String>,
    /// `metaname@name` or `name`. Only set when the first segment used the name shorthand.
    pub recipient: Option<String>,
    pub username: Option<String>,
    pub return_to: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub extra: Vec<(String, String)>,
}

impl Directive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Parses raw metadata. Absent or empty input yields an empty directive.
    pub fn decode(raw: Option<&str>) -> Self {
        let mut directive = Self::default();
        let Some(raw) = raw.filter(|raw| !raw.is_empty()) else {
            return directive;
        };

        for (index, segment) in raw.split(';').enumerate() {
            if index == 0
                && let Some((metaname, name)) = match_name(segment)
            {
                directive.recipient = Some(segment.to_string());
                directive.metaname = metaname.map(str::to_string);
                directive.name = Some(name.to_string());
                continue;
            }

            match segment.split_once('=') {
                Some((key, value)) => directive.set(key, value),
                None => directive.set_extra(&index.to_string(), segment),
            }
        }

        directive
    }

    /// Serializes as `key=value` pairs joined by `;`.
    ///
    /// Name shorthand is written back as plain pairs, so only directives made of
    /// simple pairs survive a decode/encode cycle unchanged.
    pub fn encode(&self) -> String {
        self.pairs()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Sets a key, routing recognised keys to their field.
    pub fn set(&mut self, key: &str, value: &str) {
        let field = match key {
            "username" => &mut self.username,
            "return" => &mut self.return_to,
            "message" => &mut self.message,
            "error" => &mut self.error,
            _ => return self.set_extra(key, value),
        };
        *field = Some(value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// All present pairs, recognised keys first, in a stable order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        let known = [
            ("metaname", &self.metaname),
            ("name", &self.name),
            ("recipient", &self.recipient),
            ("username", &self.username),
            ("return", &self.return_to),
            ("message", &self.message),
            ("error", &self.error),
        ];

        known
            .into_iter()
            .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
            .chain(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    fn set_extra(&mut self, key: &str, value: &str) {
        match self.extra.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.extra.push((key.to_string(), value.to_string())),
        }
    }
}

/// Free-function form of [`Directive::decode`].
pub fn decode(raw: Option<&str>) -> Directive {
    Directive::decode(raw)
}

/// Encodes an optional directive, keeping "no metadata" distinct from "empty metadata".
pub fn encode(directive: Option<&Directive>) -> Option<String> {
    directive.map(Directive::encode)
}

/// Matches `(metaname@)?name.kst`, returning the metaname and the full name.
fn match_name(segment: &str) -> Option<(Option<&str>, &str)> {
    let (metaname, name) = match segment.split_once('@') {
        Some((metaname, name)) => (Some(metaname), name),
        None => (None, segment),
    };

    if let Some(metaname) = metaname {
        let valid = (1..=MAX_METANAME_LEN).contains(&metaname.len())
            && metaname
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
        if !valid {
            return None;
        }
    }

    let label = name.strip_suffix(NAME_SUFFIX)?;
    let valid = (1..=MAX_NAME_LEN).contains(&label.len())
        && label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());

    valid.then_some((metaname, name))
}
