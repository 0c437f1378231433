use minijinja::{context, Environment, Value};

use crate::error::InstanceResult;

const STORAGE: &str = r#"<html><head>
<meta name="viewport" content="width=device-width, initial-scale=1">
<style>
body { font-family: sans-serif; padding: 20px; }
h1 { color: #333; }
ul { list-style: none; padding: 0; }
li { margin: 10px 0; }
a { color: #007BFF; text-decoration: none; font-size: 18px; }
a:hover { text-decoration: underline; }
input[type=file], input[type=submit] {
  width: 100%; padding: 10px; margin-top: 10px; font-size: 16px;
}
</style><title>{{ name }}</title></head><body>
<h1>{{ name }}: Storage</h1>
<form method="POST" enctype="multipart/form-data" action="/upload">
    <input type="file" name="files" multiple>
    <input type="submit" value="Upload">
</form>
<ul>{% for f in files %}<li><a href="/files/{{ f }}">{{ f }}</a></li>{% endfor %}</ul>
</body></html>
"#;

const SITE_FALLBACK: &str = r#"<html><head><title>{% if title %}{{ title }}{% else %}Site{% endif %}</title><meta name="description" content="{{ description }}"></head><body>
<h2>index.html not found</h2>
<a href="/site-manager">Manage site</a> |
<a href="/settings">Site settings</a></body></html>
"#;

const NEURO: &str = r#"<h2>Neural network: enter a message</h2><form method="POST" action="/chat"><input name="msg"><input type="submit"></form>
"#;

const SETTINGS: &str = r#"<h2>Site settings</h2>
<form method="POST">
    Domain: <input name="domain" value="{{ domain }}"><br>
    Title: <input name="title" value="{{ title }}"><br>
    Description: <input name="description" value="{{ description }}"><br>
    <input type="submit" value="Save">
</form>
<a href="/">Back</a>
"#;

const SITE_MANAGER: &str = r#"<h2>Site management</h2>
<form method="POST" enctype="multipart/form-data" action="/upload-site">
    <input type="file" name="files" multiple>
    <input type="submit" value="Upload HTML/ZIP">
</form>
<h3>Current files:</h3>
<ul>{% for f in files %}<li>{{ f }}</li>{% endfor %}</ul>
<a href="/settings">Site settings</a>
"#;

const UPLOADED: &str = r#"<p>Uploaded {{ count }} files. <a href="/">Back</a></p>
"#;

const CHAT: &str = r#"<p>AI received: {{ msg }}</p><a href="/">Back</a>
"#;

/// Compiled page templates. Names end in `.html`, so every value is escaped.
pub struct Pages {
    env: Environment<'static>,
}

impl Pages {
    pub fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("storage.html", STORAGE),
            ("site_fallback.html", SITE_FALLBACK),
            ("neuro.html", NEURO),
            ("settings.html", SETTINGS),
            ("site_manager.html", SITE_MANAGER),
            ("uploaded.html", UPLOADED),
            ("chat.html", CHAT),
        ] {
            env.add_template(name, source)
                .expect("built-in templates are valid");
        }
        Self { env }
    }

    pub fn render(&self, name: &str, ctx: Value) -> InstanceResult<String> {
        Ok(self.env.get_template(name)?.render(ctx)?)
    }

    pub fn storage(&self, name: &str, files: &[String]) -> InstanceResult<String> {
        self.render("storage.html", context! { name, files })
    }

    pub fn uploaded(&self, count: usize) -> InstanceResult<String> {
        self.render("uploaded.html", context! { count })
    }

    pub fn chat(&self, msg: &str) -> InstanceResult<String> {
        self.render("chat.html", context! { msg })
    }
}

impl Default for Pages {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_html_escaped() {
        let pages = Pages::new();
        let html = pages.chat("<script>alert(1)</script>").unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn storage_page_links_files() {
        let pages = Pages::new();
        let html = pages
            .storage("vault", &["a.txt".to_string(), "b.png".to_string()])
            .unwrap();
        assert!(html.contains("<title>vault</title>"));
        assert!(html.contains(r#"<a href="/files/a.txt">a.txt</a>"#));
        assert!(html.contains(r#"name="files" multiple"#));
    }
}
