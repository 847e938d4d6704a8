use serde_json::Value;

/// Builder content being edited for one invitation.
///
/// A session lives as long as one editing flow; starting a new flow means
/// calling `begin` again, never reusing an old session.
#[derive(Debug, Clone, PartialEq)]
pub struct EditingSession {
    slug: String,
    content: Value,
}

impl EditingSession {
    pub fn begin(slug: &str, content: Value) -> Self {
        Self {
            slug: slug.trim().to_string(),
            content,
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    pub fn update_content(&mut self, content: Value) {
        self.content = content;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_begin_starts_from_given_content() {
        let mut session = EditingSession::begin(" our-day ", json!({ "title": "A" }));
        assert_eq!(session.slug(), "our-day");

        session.update_content(json!({ "title": "B" }));
        assert_eq!(session.content()["title"], "B");

        let fresh = EditingSession::begin("our-day", json!({}));
        assert_eq!(fresh.content(), &json!({}));
    }
}
