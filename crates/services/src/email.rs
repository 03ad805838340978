//! HTML email composition.
//!
//! Templates live under `templates/email/` and are compiled in by askama.
//! A notice carries an `EmailSpec`; it is rendered at delivery time, once the
//! recipient's name and address have been looked up.

use askama::Template;

use domains::{AppError, Result, User};

#[derive(Template)]
#[template(path = "email/notice.html")]
struct NoticeEmail<'a> {
    recipient: &'a str,
    headline: &'a str,
    body: &'a str,
    link: Option<&'a str>,
}

#[derive(Template)]
#[template(path = "email/welcome.html")]
struct WelcomeEmail<'a> {
    name: &'a str,
    username: &'a str,
    home: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmailTemplate {
    Notice {
        headline: String,
        body: String,
        link: Option<String>,
    },
    Welcome {
        home: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailSpec {
    pub subject: String,
    pub template: EmailTemplate,
}

impl EmailSpec {
    pub fn notice(
        subject: impl Into<String>,
        headline: impl Into<String>,
        body: impl Into<String>,
        link: Option<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            template: EmailTemplate::Notice {
                headline: headline.into(),
                body: body.into(),
                link,
            },
        }
    }

    pub fn welcome(home: impl Into<String>) -> Self {
        Self {
            subject: "Welcome to askboard".into(),
            template: EmailTemplate::Welcome { home: home.into() },
        }
    }

    /// Renders the HTML body for `recipient`.
    pub fn render(&self, recipient: &User) -> Result<String> {
        let rendered = match &self.template {
            EmailTemplate::Notice {
                headline,
                body,
                link,
            } => NoticeEmail {
                recipient: &recipient.name,
                headline,
                body,
                link: link.as_deref(),
            }
            .render(),
            EmailTemplate::Welcome { home } => WelcomeEmail {
                name: &recipient.name,
                username: &recipient.username,
                home,
            }
            .render(),
        };
        rendered.map_err(|err| AppError::Internal(format!("email template: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::Role;
    use uuid::Uuid;

    fn recipient() -> User {
        let now = Utc::now();
        User {
            id: Uuid::now_v7(),
            name: "Ada <Admin>".into(),
            email: "ada@example.com".into(),
            username: "ada".into(),
            password_hash: None,
            role: Role::User,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn notice_escapes_user_text_and_includes_link() {
        let spec = EmailSpec::notice(
            "New answer",
            "Your question has a new answer",
            "bob answered \"Why <Pin>?\"",
            Some("https://askboard.test/questions/1".into()),
        );
        let html = spec.render(&recipient()).unwrap();
        assert!(html.contains("Ada &lt;Admin&gt;"));
        assert!(!html.contains("<Pin>"));
        assert!(html.contains("https://askboard.test/questions/1"));
    }

    #[test]
    fn notice_without_link_omits_the_anchor() {
        let spec = EmailSpec::notice("s", "h", "b", None);
        let html = spec.render(&recipient()).unwrap();
        assert!(!html.contains("View on askboard"));
    }

    #[test]
    fn welcome_mentions_the_username() {
        let html = EmailSpec::welcome("https://askboard.test")
            .render(&recipient())
            .unwrap();
        assert!(html.contains("@ada"));
    }
}
