//! `site/site.conf`: three `key=value` lines describing the site.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SiteConf {
    pub domain: String,
    pub title: String,
    pub description: String,
}

/// Form body of `POST /settings`. Missing fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub domain: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl SiteConf {
    /// Only lines starting with a known key count; the value is everything
    /// after the first `=`, minus trailing whitespace.
    pub fn parse(text: &str) -> Self {
        let mut conf = SiteConf::default();
        for line in text.lines() {
            if let Some(value) = line.strip_prefix("domain=") {
                conf.domain = value.trim_end().to_string();
            } else if let Some(value) = line.strip_prefix("title=") {
                conf.title = value.trim_end().to_string();
            } else if let Some(value) = line.strip_prefix("description=") {
                conf.description = value.trim_end().to_string();
            }
        }
        conf
    }

    pub fn render(&self) -> String {
        format!(
            "domain={}\ntitle={}\ndescription={}\n",
            single_line(&self.domain),
            single_line(&self.title),
            single_line(&self.description)
        )
    }

    /// A missing file reads as empty settings.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err),
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        fs::write(path, self.render())
    }

    pub fn merge(&mut self, update: SettingsUpdate) {
        if let Some(domain) = update.domain {
            self.domain = domain;
        }
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
    }
}

// A newline inside a value would smuggle in another key.
fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_keys_only() {
        let conf = SiteConf::parse(
            "domain=example.org\ntitle=My = Site \nowner=me\n  description=indented\n",
        );
        assert_eq!(conf.domain, "example.org");
        assert_eq!(conf.title, "My = Site");
        assert_eq!(conf.description, "");
    }

    #[test]
    fn keeps_leading_spaces_in_values() {
        let conf = SiteConf::parse("title=  Indented title \t\ndomain= a.org\n");
        assert_eq!(conf.title, "  Indented title");
        assert_eq!(conf.domain, " a.org");
    }

    #[test]
    fn merge_keeps_missing_fields() {
        let mut conf = SiteConf {
            domain: "a.org".into(),
            title: "A".into(),
            description: "first".into(),
        };
        conf.merge(SettingsUpdate {
            title: Some("B".into()),
            ..SettingsUpdate::default()
        });
        assert_eq!(conf.title, "B");
        assert_eq!(conf.domain, "a.org");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.conf");
        assert_eq!(SiteConf::load(&path).unwrap(), SiteConf::default());

        let conf = SiteConf {
            domain: "b.org".into(),
            title: "two\nlines".into(),
            description: "d".into(),
        };
        conf.save(&path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "domain=b.org\ntitle=two lines\ndescription=d\n"
        );
        assert_eq!(SiteConf::load(&path).unwrap().title, "two lines");
    }
}
