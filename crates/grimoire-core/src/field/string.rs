use crate::{
    field::choices::Choices,
    types::{Id, Json},
};

///
/// StringOptions
///

#[derive(Clone, Debug)]
pub struct StringOptions {
    /// Accept the empty string.
    pub blank: bool,
    /// Strip leading/trailing whitespace during cleaning.
    pub trim: bool,
    pub choices: Option<Choices>,
}

impl Default for StringOptions {
    fn default() -> Self {
        Self {
            blank: true,
            trim: true,
            choices: None,
        }
    }
}

///
/// FileCategory
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileCategory {
    Image,
    Audio,
    Video,
    Text,
    Font,
}

impl FileCategory {
    #[must_use]
    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Image => &["avif", "bmp", "gif", "jpeg", "jpg", "png", "svg", "webp"],
            Self::Audio => &["flac", "m4a", "mid", "mp3", "ogg", "opus", "wav", "webm"],
            Self::Video => &["m4v", "mp4", "ogv", "webm"],
            Self::Text => &["csv", "json", "md", "pdf", "txt", "xml", "yml"],
            Self::Font => &["otf", "ttf", "woff", "woff2"],
        }
    }
}

///
/// FilePathOptions
///

#[derive(Clone, Debug, Default)]
pub struct FilePathOptions {
    /// Allowed file categories; empty means any extension.
    pub categories: Vec<FileCategory>,
}

/// Coerce and normalize a plain string candidate.
#[must_use]
pub fn clean(value: Json, options: &StringOptions) -> Json {
    let text = match value {
        Json::String(s) => s,
        Json::Number(n) => n.to_string(),
        Json::Bool(b) => b.to_string(),
        other => return other,
    };

    if options.trim {
        Json::String(text.trim().to_string())
    } else {
        Json::String(text)
    }
}

/// Type-specific validation pass for plain strings.
pub fn validate(value: &Json, options: &StringOptions) -> Result<(), String> {
    let Some(text) = value.as_str() else {
        return Err(format!("{value} is not a string"));
    };

    if let Some(choices) = &options.choices {
        if !choices.contains(value) {
            return Err(format!("\"{text}\" is not a valid choice"));
        }

        return Ok(());
    }

    if !options.blank && text.is_empty() {
        return Err("may not be blank".to_string());
    }

    Ok(())
}

/// Normalize a color candidate to lowercase `#rrggbb` form.
#[must_use]
pub fn clean_color(value: Json) -> Json {
    let Json::String(text) = value else {
        return value;
    };
    let text = text.trim().to_ascii_lowercase();

    // expand the #rgb short form
    let bytes = text.as_bytes();
    if bytes.len() == 4 && bytes[0] == b'#' && bytes[1..].iter().all(u8::is_ascii_hexdigit) {
        let expanded: String = text[1..]
            .chars()
            .flat_map(|c| [c, c])
            .collect();

        return Json::String(format!("#{expanded}"));
    }

    Json::String(text)
}

pub fn validate_color(value: &Json) -> Result<(), String> {
    let Some(text) = value.as_str() else {
        return Err(format!("{value} is not a color string"));
    };

    let bytes = text.as_bytes();
    let well_formed = bytes.len() == 7
        && bytes[0] == b'#'
        && bytes[1..]
            .iter()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b));

    if well_formed {
        Ok(())
    } else {
        Err(format!("\"{text}\" is not a color in #rrggbb form"))
    }
}

pub fn validate_identifier(value: &Json) -> Result<(), String> {
    let Some(text) = value.as_str() else {
        return Err(format!("{value} is not an identifier string"));
    };

    Id::try_parse(text)
        .map(|_| ())
        .map_err(|err| format!("\"{text}\" is not a valid identifier: {err}"))
}

pub fn validate_file_path(value: &Json, options: &FilePathOptions) -> Result<(), String> {
    let Some(text) = value.as_str() else {
        return Err(format!("{value} is not a file path"));
    };

    if options.categories.is_empty() || text.is_empty() {
        return Ok(());
    }

    let extension = text
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let allowed = options
        .categories
        .iter()
        .any(|category| category.extensions().contains(&extension.as_str()));

    if allowed {
        Ok(())
    } else {
        Err(format!("\"{text}\" does not match an allowed file category"))
    }
}

/// Coerce a JSON-string candidate: structured values are serialized.
#[must_use]
pub fn clean_json(value: Json) -> Json {
    match value {
        Json::String(s) => Json::String(s.trim().to_string()),
        Json::Null => Json::Null,
        other => Json::String(other.to_string()),
    }
}

pub fn validate_json(value: &Json) -> Result<(), String> {
    let Some(text) = value.as_str() else {
        return Err(format!("{value} is not a JSON string"));
    };

    serde_json::from_str::<Json>(text)
        .map(|_| ())
        .map_err(|_| format!("\"{text}\" is not valid JSON"))
}
