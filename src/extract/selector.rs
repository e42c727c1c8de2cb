//! Configurable CSS-selector extractor.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use super::{InvalidSelector, ParseFailure, RecordExtractor};
use crate::models::Record;

/// How to pull one named field out of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Field name in the resulting record.
    pub name: String,
    /// CSS selector for candidate elements.
    pub selector: String,
    /// Read this attribute instead of the element text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
    /// Only consider elements whose text contains this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    /// Keep only the text after this marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    /// Sub-selectors read inside each match and joined with `cell_separator`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cells: Vec<String>,
    #[serde(default = "default_cell_separator")]
    pub cell_separator: String,
    /// Join every match with this separator. Without it only the first
    /// non-empty match is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<String>,
    /// Scheme prepended to protocol-relative values (`//host/path`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_scheme: Option<String>,
}

fn default_cell_separator() -> String {
    " ".to_string()
}

impl FieldRule {
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            attr: None,
            contains: None,
            after: None,
            cells: Vec::new(),
            cell_separator: default_cell_separator(),
            join: None,
            url_scheme: None,
        }
    }

    pub fn attr(mut self, attr: impl Into<String>) -> Self {
        self.attr = Some(attr.into());
        self
    }

    pub fn containing(mut self, needle: impl Into<String>) -> Self {
        self.contains = Some(needle.into());
        self
    }

    pub fn after(mut self, marker: impl Into<String>) -> Self {
        self.after = Some(marker.into());
        self
    }

    pub fn cells(mut self, cells: &[&str]) -> Self {
        self.cells = cells.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn join(mut self, separator: impl Into<String>) -> Self {
        self.join = Some(separator.into());
        self
    }

    pub fn url_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.url_scheme = Some(scheme.into());
        self
    }
}

/// Extractor configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Selector that must match on a real record page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldRule>,
}

struct CompiledRule {
    rule: FieldRule,
    selector: Selector,
    cells: Vec<Selector>,
}

/// [`RecordExtractor`] driven by [`FieldRule`]s.
pub struct SelectorExtractor {
    marker: Option<(String, Selector)>,
    rules: Vec<CompiledRule>,
}

fn compile(selector: &str, context: &str) -> Result<Selector, InvalidSelector> {
    Selector::parse(selector).map_err(|e| InvalidSelector {
        selector: selector.to_string(),
        context: context.to_string(),
        message: e.to_string(),
    })
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

impl SelectorExtractor {
    /// Compile every selector up front so a bad config fails at startup.
    pub fn new(config: &ExtractorConfig) -> Result<Self, InvalidSelector> {
        let marker = match &config.required_selector {
            Some(raw) => Some((raw.clone(), compile(raw, "required_selector")?)),
            None => None,
        };

        let mut rules = Vec::with_capacity(config.fields.len());
        for rule in &config.fields {
            let context = format!("field `{}`", rule.name);
            let selector = compile(&rule.selector, &context)?;
            let cells = rule
                .cells
                .iter()
                .map(|c| compile(c, &context))
                .collect::<Result<Vec<_>, _>>()?;
            rules.push(CompiledRule {
                rule: rule.clone(),
                selector,
                cells,
            });
        }

        Ok(Self { marker, rules })
    }
}

impl CompiledRule {
    fn value_of(&self, element: &ElementRef<'_>) -> Option<String> {
        let raw = if !self.cells.is_empty() {
            let parts: Vec<String> = self
                .cells
                .iter()
                .filter_map(|cell| element.select(cell).next())
                .map(|cell| element_text(&cell))
                .filter(|text| !text.is_empty())
                .collect();
            parts.join(&self.rule.cell_separator)
        } else if let Some(attr) = &self.rule.attr {
            element.value().attr(attr)?.trim().to_string()
        } else {
            element_text(element)
        };

        let mut value = match &self.rule.after {
            Some(marker) => match raw.split_once(marker.as_str()) {
                Some((_, rest)) => rest.trim().to_string(),
                None => raw,
            },
            None => raw,
        };

        if let Some(scheme) = &self.rule.url_scheme {
            if value.starts_with("//") {
                value = format!("{}:{}", scheme, value);
            }
        }

        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    fn extract(&self, document: &Html) -> Option<String> {
        let candidates = document.select(&self.selector).filter(|el| {
            self.rule
                .contains
                .as_ref()
                .map_or(true, |needle| element_text(el).contains(needle.as_str()))
        });

        match &self.rule.join {
            Some(separator) => {
                let values: Vec<String> = candidates.filter_map(|el| self.value_of(&el)).collect();
                if values.is_empty() {
                    None
                } else {
                    Some(values.join(separator))
                }
            }
            None => candidates.filter_map(|el| self.value_of(&el)).next(),
        }
    }
}

impl RecordExtractor for SelectorExtractor {
    fn extract(&self, target: &str, content: &str) -> Result<Record, ParseFailure> {
        let document = Html::parse_document(content);

        if let Some((raw, marker)) = &self.marker {
            if document.select(marker).next().is_none() {
                return Err(ParseFailure::MissingMarker(raw.clone()));
            }
        }

        let mut record = Record::new(target);
        for rule in &self.rules {
            if let Some(value) = rule.extract(&document) {
                record.set(rule.rule.name.clone(), value);
            }
        }

        // Without a page marker an empty result means nothing recognisable.
        if self.marker.is_none() && record.fields.is_empty() {
            return Err(ParseFailure::Empty);
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="infotitlediv">
            <span class="infocname"> 月季花 </span>
            <div class="infomore">俗名：月月红、长春花</div>
          </div>
          <div id="rightclasssys">
            <div><a>被子植物门</a></div>
            <div><a>蔷薇科 Rosaceae</a></div>
            <div><a>蔷薇属 Rosa</a></div>
          </div>
          <div id="cont_mp11"><table class="t2">
            <tr><td class="td1">茎</td><td class="td2">直立灌木</td></tr>
            <tr><td class="td1">叶</td><td class="td2">小叶3-5</td></tr>
          </table></div>
          <div id="imglist"><img src="//img.example.org/rosa.jpg"></div>
        </body></html>
    "#;

    fn config() -> ExtractorConfig {
        ExtractorConfig {
            required_selector: Some(".infotitlediv".to_string()),
            fields: vec![
                FieldRule::new("chinese_name", ".infocname"),
                FieldRule::new("common_name", ".infomore").after("俗名："),
                FieldRule::new("family", "#rightclasssys div a").containing("科"),
                FieldRule::new("genus", "#rightclasssys div a").containing("属"),
                FieldRule::new("description", "#cont_mp11 table.t2 tr")
                    .cells(&[".td1", ".td2"])
                    .join("\n"),
                FieldRule::new("ecology", "#cont_mp12 table.t2 tr")
                    .cells(&[".td1", ".td2"])
                    .join("\n"),
                FieldRule::new("image_url", "#imglist img")
                    .attr("src")
                    .url_scheme("https"),
            ],
        }
    }

    #[test]
    fn test_extracts_configured_fields() {
        let extractor = SelectorExtractor::new(&config()).unwrap();
        let record = extractor.extract("Rosa chinensis", PAGE).unwrap();

        assert_eq!(record.key, "Rosa chinensis");
        assert_eq!(record.field("chinese_name"), Some("月季花"));
        assert_eq!(record.field("common_name"), Some("月月红、长春花"));
        assert_eq!(record.field("family"), Some("蔷薇科 Rosaceae"));
        assert_eq!(record.field("genus"), Some("蔷薇属 Rosa"));
        assert_eq!(record.field("description"), Some("茎 直立灌木\n叶 小叶3-5"));
        assert_eq!(
            record.field("image_url"),
            Some("https://img.example.org/rosa.jpg")
        );
        assert_eq!(record.field("ecology"), None);
    }

    #[test]
    fn test_missing_marker_is_parse_failure() {
        let extractor = SelectorExtractor::new(&config()).unwrap();
        let err = extractor
            .extract("Rosa chinensis", "<html><body><p>maintenance</p></body></html>")
            .unwrap_err();
        assert_eq!(err, ParseFailure::MissingMarker(".infotitlediv".to_string()));
    }

    #[test]
    fn test_empty_without_marker_is_parse_failure() {
        let config = ExtractorConfig {
            required_selector: None,
            fields: vec![FieldRule::new("title", "h1")],
        };
        let extractor = SelectorExtractor::new(&config).unwrap();
        assert_eq!(
            extractor.extract("x", "<p>nothing</p>").unwrap_err(),
            ParseFailure::Empty
        );
    }

    #[test]
    fn test_invalid_selector_rejected_at_construction() {
        let config = ExtractorConfig {
            required_selector: None,
            fields: vec![FieldRule::new("broken", "div[")],
        };
        let err = SelectorExtractor::new(&config).err().unwrap();
        assert_eq!(err.selector, "div[");
        assert!(err.context.contains("broken"));
    }

    #[test]
    fn test_field_rule_from_toml_defaults() {
        let rule: FieldRule = toml::from_str(
            r#"
            name = "family"
            selector = "a"
            contains = "科"
            "#,
        )
        .unwrap();
        assert_eq!(rule.cell_separator, " ");
        assert!(rule.join.is_none());
        assert_eq!(rule.contains.as_deref(), Some("科"));
    }
}
