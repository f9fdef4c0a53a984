use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use regex::Regex;
use serde_yaml::{Mapping, Value};
use tempfile::NamedTempFile;
use thiserror::Error;

const FRONT_MATTER_DELIMITER: &str = "---";

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("failed to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no front matter found in {0:?}: file must start with ---")]
    NoFrontMatter(PathBuf),

    #[error("unclosed front matter in {0:?}: missing second ---")]
    Unclosed(PathBuf),

    #[error("invalid front matter in {path:?}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("front matter of {0:?} is not a mapping")]
    NotAMapping(PathBuf),

    #[error("failed to write {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

fn front_matter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // header is lazy so that a `---` line inside the body never closes it
    PATTERN.get_or_init(|| {
        regex::RegexBuilder::new(r"\A---[ \t]*\r?\n(.*?)^---[ \t]*(?:\r?\n|\z)(.*)\z")
            .dot_matches_new_line(true)
            .multi_line(true)
            .build()
            .unwrap()
    })
}

/// A markdown post: a YAML front matter block followed by the body.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Post {
    path: PathBuf,
    front_matter: Mapping,
    content: String,
}

impl Post {
    pub fn new(path: impl Into<PathBuf>, front_matter: Mapping, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            front_matter,
            content: content.into(),
        }
    }

    /// Reads and splits the file at `path`.
    pub fn parse(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse_str(path, &text)
    }

    /// Splits `text` as if it had been read from `path`.
    pub fn parse_str(path: impl Into<PathBuf>, text: &str) -> Result<Self> {
        let path = path.into();
        if !text.starts_with(FRONT_MATTER_DELIMITER) {
            return Err(Error::NoFrontMatter(path));
        }
        let Some(caps) = front_matter_pattern().captures(text) else {
            return Err(Error::Unclosed(path));
        };

        let header = &caps[1];
        let front_matter = if header.trim().is_empty() {
            Mapping::new()
        } else {
            Self::decode(path.as_path(), header)?
        };
        let content = caps[2].trim();

        Ok(Self::new(path, front_matter, content))
    }

    fn decode(path: &Path, header: &str) -> Result<Mapping> {
        match serde_yaml::from_str::<Value>(header) {
            // a header holding only comments
            Ok(Value::Null) => Ok(Mapping::new()),
            Ok(Value::Mapping(m)) => Ok(m),
            Ok(_) => Err(Error::NotAMapping(path.to_owned())),
            Err(source) => Err(Error::Yaml {
                path: path.to_owned(),
                source,
            }),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// The live front matter. Changes made through [`Post::front_matter_mut`]
    /// are what [`Post::save`] writes.
    pub fn front_matter(&self) -> &Mapping {
        &self.front_matter
    }

    pub fn front_matter_mut(&mut self) -> &mut Mapping {
        &mut self.front_matter
    }

    pub fn get_front_matter(&self, key: &str) -> Option<&Value> {
        self.front_matter.get(key)
    }

    /// Inserts `key`, or overwrites it in place if it is already present.
    pub fn add_front_matter(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.front_matter_mut()
            .insert(Value::String(key.into()), value.into());
    }

    pub fn render(&self) -> Result<String> {
        let yaml = serde_yaml::to_string(self.front_matter()).map_err(|source| Error::Yaml {
            path: self.path.clone(),
            source,
        })?;
        Ok(format!(
            "{FRONT_MATTER_DELIMITER}\n{yaml}{FRONT_MATTER_DELIMITER}\n{}",
            self.content()
        ))
    }

    /// Overwrites the backing file. The new contents go to a temporary file
    /// next to it which is then renamed over the original. A symlinked post
    /// has its target rewritten and keeps the link.
    pub fn save(&self) -> Result<()> {
        let rendered = self.render()?;
        let write_err = |source| Error::Write {
            path: self.path.clone(),
            source,
        };

        let target = fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(rendered.as_bytes()).map_err(write_err)?;
        if let Ok(meta) = fs::metadata(&target) {
            tmp.as_file()
                .set_permissions(meta.permissions())
                .map_err(write_err)?;
        }
        tmp.persist(&target).map_err(|e| write_err(e.error))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn parse_splits_front_matter_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("post.md");
        fs::write(&path, "---\ntitle: Test\n---\ncontent").unwrap();

        let post = Post::parse(&path).unwrap();

        assert_eq!(post.file_path(), path);
        assert_eq!(post.front_matter(), &mapping("title: Test"));
        assert_eq!(post.content(), "content");
    }

    #[test]
    fn parse_trims_content() {
        let post = Post::parse_str("p.md", "---\ntitle: Test\n---\n\n  content\n\n").unwrap();
        assert_eq!(post.content(), "content");
    }

    #[test]
    fn parse_accepts_crlf() {
        let post = Post::parse_str("p.md", "---\r\ntitle: Test\r\ntags: [a, b]\r\n---\r\nbody\r\n")
            .unwrap();
        assert_eq!(post.front_matter(), &mapping("title: Test\ntags: [a, b]"));
        assert_eq!(post.content(), "body");
    }

    #[test]
    fn delimiter_in_body_is_content() {
        let text = "---\ntitle: Test\n---\nabove\n---\nbelow\n";
        let post = Post::parse_str("p.md", text).unwrap();
        assert_eq!(post.front_matter(), &mapping("title: Test"));
        assert_eq!(post.content(), "above\n---\nbelow");
    }

    #[test]
    fn empty_header_is_empty_mapping() {
        let post = Post::parse_str("p.md", "---\n---\nbody").unwrap();
        assert!(post.front_matter().is_empty());
        assert_eq!(post.content(), "body");
    }

    #[test]
    fn header_without_body() {
        let post = Post::parse_str("p.md", "---\ntitle: Test\n---").unwrap();
        assert_eq!(post.front_matter(), &mapping("title: Test"));
        assert_eq!(post.content(), "");
    }

    #[test]
    fn missing_front_matter() {
        let err = Post::parse_str("p.md", "just text").unwrap_err();
        assert!(matches!(err, Error::NoFrontMatter(_)));
    }

    #[test]
    fn unclosed_front_matter() {
        let err = Post::parse_str("p.md", "---\ntitle: Test\ncontent").unwrap_err();
        assert!(matches!(err, Error::Unclosed(_)));
    }

    #[test]
    fn invalid_yaml() {
        let err = Post::parse_str("p.md", "---\ntitle: [unclosed\n---\nbody").unwrap_err();
        assert!(matches!(err, Error::Yaml { .. }));
    }

    #[test]
    fn scalar_header_is_rejected() {
        let err = Post::parse_str("p.md", "---\njust a string\n---\nbody").unwrap_err();
        assert!(matches!(err, Error::NotAMapping(_)));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Post::parse(dir.path().join("nope.md")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn add_front_matter_appends() {
        let mut post = Post::new("p.md", mapping("title: Test"), "content");
        post.add_front_matter("author", "Author");
        assert_eq!(post.front_matter(), &mapping("title: Test\nauthor: Author"));
    }

    #[test]
    fn add_front_matter_overwrites_in_place() {
        let mut post = Post::new(
            "p.md",
            mapping("title: Test\nlast_modified_at: old\ndraft: false"),
            "content",
        );
        let t = "2022-01-01T00:00:00+00:00";
        post.add_front_matter("last_modified_at", t);
        post.add_front_matter("last_modified_at", t);

        let keys: Vec<_> = post
            .front_matter()
            .keys()
            .map(|k| k.as_str().unwrap())
            .collect();
        assert_eq!(keys, ["title", "last_modified_at", "draft"]);
        assert_eq!(
            post.get_front_matter("last_modified_at"),
            Some(&Value::from(t))
        );
    }

    #[test]
    fn front_matter_is_live() {
        let mut post = Post::new("p.md", mapping("title: Test"), "content");
        post.front_matter_mut()
            .insert("author".into(), "Author".into());

        assert_eq!(post.get_front_matter("author"), Some(&Value::from("Author")));
        assert!(post.render().unwrap().contains("author: Author\n"));
    }

    #[test]
    fn save_writes_exact_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("post.md");
        fs::write(&path, "old").unwrap();

        let post = Post::new(&path, mapping("title: Test\nauthor: Author"), "content");
        post.save().unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "---\ntitle: Test\nauthor: Author\n---\ncontent"
        );
    }

    #[test]
    fn save_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.md");

        Post::new(&path, mapping("title: New"), "hello").save().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "---\ntitle: New\n---\nhello");
    }

    #[cfg(unix)]
    #[test]
    fn save_through_symlink_keeps_link() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.md");
        let link = dir.path().join("link.md");
        fs::write(&real, "---\ntitle: Test\n---\ncontent").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let mut post = Post::parse(&link).unwrap();
        post.add_front_matter("author", "Author");
        post.save().unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(post.file_path(), link);
        assert_eq!(
            fs::read_to_string(&real).unwrap(),
            "---\ntitle: Test\nauthor: Author\n---\ncontent"
        );
    }

    #[test]
    fn round_trip_keeps_front_matter_and_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("post.md");
        let original = "---\n\
            title: \"Hello: world\"\n\
            date: 2021-06-01\n\
            tags:\n  - rust\n  - blog\n\
            author:\n  name: A\n  url: https://example.com\n\
            draft: false\n\
            ---\n\
            # Heading\n\nSome *text*.\n\n---\n\nMore text.";
        fs::write(&path, original).unwrap();

        let before = Post::parse(&path).unwrap();
        before.save().unwrap();
        let after = Post::parse(&path).unwrap();

        assert_eq!(after.front_matter(), before.front_matter());
        assert_eq!(after.content(), before.content());
        assert_eq!(
            after.content(),
            "# Heading\n\nSome *text*.\n\n---\n\nMore text."
        );
    }
}
