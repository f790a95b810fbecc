//! Values typed into form fields before a form is serialized.

use std::collections::HashMap;

use crate::config::DEFAULT_INPUT_TEXT;

struct FieldCategory {
    name: &'static str,
    keywords: &'static [&'static str],
    value: &'static str,
}

/// Checked in order; the first category with a keyword contained in the
/// field name wins.
const FIELD_CATEGORIES: &[FieldCategory] = &[
    FieldCategory {
        name: "mail",
        keywords: &["mail"],
        value: "reqhound@example.com",
    },
    FieldCategory {
        name: "code",
        keywords: &["yanzhengma", "code", "ver", "captcha"],
        value: "123a",
    },
    FieldCategory {
        name: "phone",
        keywords: &["phone", "number", "tel", "shouji"],
        value: "18812345678",
    },
    FieldCategory {
        name: "username",
        keywords: &["name", "user", "id", "login", "account"],
        value: "reqhound@example.com",
    },
    FieldCategory {
        name: "password",
        keywords: &["pass", "pwd"],
        value: "Reqhound6.",
    },
    FieldCategory {
        name: "qq",
        keywords: &["qq", "wechat", "tencent", "weixin"],
        value: "123456789",
    },
    FieldCategory {
        name: "id_card",
        keywords: &["card", "shenfen"],
        value: "511702197409284963",
    },
    FieldCategory {
        name: "url",
        keywords: &["url", "site", "web", "blog", "link"],
        value: "https://reqhound.example.com/",
    },
    FieldCategory {
        name: "date",
        keywords: &["date", "time", "year", "now"],
        value: "2018-01-01",
    },
    FieldCategory {
        name: "number",
        keywords: &["day", "age", "num", "count"],
        value: "10",
    },
];

/// Operator overrides applied on top of the built-in category table.
#[derive(Debug, Clone, Copy)]
pub struct FormFiller<'a> {
    custom_values: &'a HashMap<String, String>,
    keyword_values: &'a HashMap<String, String>,
}

impl<'a> FormFiller<'a> {
    pub fn new(
        custom_values: &'a HashMap<String, String>,
        keyword_values: &'a HashMap<String, String>,
    ) -> Self {
        Self {
            custom_values,
            keyword_values,
        }
    }

    /// Value for an empty field. `input_type` is the lower-cased `type`
    /// attribute (`text` when absent).
    pub fn value_for(&self, field_name: &str, input_type: &str) -> String {
        let name = field_name.to_ascii_lowercase();

        let mut keyword_hits = self
            .keyword_values
            .iter()
            .filter(|(keyword, _)| {
                !keyword.is_empty() && name.contains(&keyword.to_ascii_lowercase())
            })
            .collect::<Vec<_>>();
        keyword_hits.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));
        if let Some((_, value)) = keyword_hits.first() {
            return (*value).clone();
        }

        let by_type = match input_type {
            "email" => Some("mail"),
            "password" => Some("password"),
            "tel" => Some("phone"),
            "url" => Some("url"),
            "date" | "datetime-local" | "month" | "week" | "time" => Some("date"),
            "number" | "range" => Some("number"),
            _ => None,
        };
        let category = by_type.or_else(|| {
            FIELD_CATEGORIES
                .iter()
                .find(|c| c.keywords.iter().any(|k| name.contains(k)))
                .map(|c| c.name)
        });

        match category {
            Some(category) => self.category_value(category),
            None => self.default_value(),
        }
    }

    fn category_value(&self, category: &str) -> String {
        if let Some(custom) = self.custom_values.get(category) {
            return custom.clone();
        }
        FIELD_CATEGORIES
            .iter()
            .find(|c| c.name == category)
            .map(|c| c.value.to_string())
            .unwrap_or_else(|| self.default_value())
    }

    pub fn default_value(&self) -> String {
        self.custom_values
            .get("default")
            .cloned()
            .unwrap_or_else(|| DEFAULT_INPUT_TEXT.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_builtin_categories() {
        let empty = HashMap::new();
        let filler = FormFiller::new(&empty, &empty);
        assert_eq!(filler.value_for("user_email", "text"), "reqhound@example.com");
        assert_eq!(filler.value_for("pwd", "text"), "Reqhound6.");
        assert_eq!(filler.value_for("anything", "password"), "Reqhound6.");
        assert_eq!(filler.value_for("comment", "text"), DEFAULT_INPUT_TEXT);
    }

    #[test]
    fn test_custom_category_value_overrides_builtin() {
        let custom = map(&[("password", "S3cret!"), ("default", "hello")]);
        let empty = HashMap::new();
        let filler = FormFiller::new(&custom, &empty);
        assert_eq!(filler.value_for("passwd", "text"), "S3cret!");
        assert_eq!(filler.value_for("comment", "text"), "hello");
    }

    #[test]
    fn test_keyword_values_win_over_categories() {
        let empty = HashMap::new();
        let keywords = map(&[("captcha", "0000"), ("user", "admin")]);
        let filler = FormFiller::new(&empty, &keywords);
        assert_eq!(filler.value_for("Captcha_Input", "text"), "0000");
        assert_eq!(filler.value_for("username", "email"), "admin");
    }
}
