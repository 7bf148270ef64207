use serde::{Deserialize, Serialize};

use crate::channels::{Catalog, Channel};

/// Value used by selection widgets to mean "no constraint".
pub const ALL: &str = "All";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Category,
    Language,
    Country,
    Region,
}

impl CategoryKind {
    /// The `#EXTINF` attribute holding this kind of metadata.
    pub fn attribute_key(self) -> &'static str {
        match self {
            Self::Category => "group-title",
            Self::Language => "tvg-language",
            Self::Country => "tvg-country",
            Self::Region => "tvg-region",
        }
    }
}

/// How categorical constraints are checked against a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryMatch {
    /// Case-sensitive substring of the channel name.
    #[default]
    Name,
    /// Case-insensitive match against one of the `;`-separated values of the
    /// corresponding attribute.
    Attribute,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    /// Free-text search, case-insensitive against the name.
    pub text: String,
    pub category: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
}

impl FilterCriteria {
    pub fn search(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with(mut self, kind: CategoryKind, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        match kind {
            CategoryKind::Category => self.category = value,
            CategoryKind::Language => self.language = value,
            CategoryKind::Country => self.country = value,
            CategoryKind::Region => self.region = value,
        }
        self
    }

    /// Active categorical constraints. Empty values and `"All"` are skipped.
    pub fn constraints(&self) -> impl Iterator<Item = (CategoryKind, &str)> {
        [
            (CategoryKind::Category, &self.category),
            (CategoryKind::Language, &self.language),
            (CategoryKind::Country, &self.country),
            (CategoryKind::Region, &self.region),
        ]
        .into_iter()
        .filter_map(|(kind, value)| {
            let value = value.as_deref()?;
            (!value.is_empty() && value != ALL).then_some((kind, value))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.constraints().next().is_none()
    }

    pub fn matches(&self, channel: &Channel, mode: CategoryMatch) -> bool {
        if !self.text.is_empty()
            && !channel
                .name
                .to_lowercase()
                .contains(&self.text.to_lowercase())
        {
            return false;
        }

        self.constraints()
            .all(|(kind, value)| category_matches(channel, kind, value, mode))
    }

    /// In-order subset of `channels` satisfying every active constraint.
    pub fn apply<'a, I>(&self, channels: I, mode: CategoryMatch) -> Vec<&'a Channel>
    where
        I: IntoIterator<Item = &'a Channel>,
    {
        channels
            .into_iter()
            .filter(|channel| self.matches(channel, mode))
            .collect()
    }
}

fn category_matches(channel: &Channel, kind: CategoryKind, value: &str, mode: CategoryMatch) -> bool {
    match mode {
        CategoryMatch::Name => channel.name.contains(value),
        CategoryMatch::Attribute => {
            let wanted = value.to_lowercase();
            channel
                .attribute(kind.attribute_key())
                .map(|attr| attr.split(';').any(|v| v.trim().to_lowercase() == wanted))
                .unwrap_or(false)
        }
    }
}

pub fn apply_filter<'a>(
    catalog: &'a Catalog,
    criteria: &FilterCriteria,
    mode: CategoryMatch,
) -> Vec<&'a Channel> {
    criteria.apply(catalog, mode)
}
