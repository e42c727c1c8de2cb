//! Built-in source profile for iplant.cn, the default harvest target.

use crate::extract::{ExtractorConfig, FieldRule};

pub const URL_TEMPLATE: &str = "https://www.iplant.cn/info/{target}";

pub fn url_template() -> String {
    URL_TEMPLATE.to_string()
}

pub fn not_found_phrases() -> Vec<String> {
    vec!["找不到符合条件的数据".to_string()]
}

/// Anonymous quota and access-restriction pages.
pub fn block_phrases() -> Vec<String> {
    vec![
        "网站访问受限".to_string(),
        "今日匿名访问次数已超".to_string(),
    ]
}

pub fn block_statuses() -> Vec<u16> {
    vec![403, 429]
}

pub fn not_found_statuses() -> Vec<u16> {
    vec![404, 410]
}

pub fn required_fields() -> Vec<String> {
    ["chinese_name", "family", "genus", "description"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn table_rows(name: &str, container: &str) -> FieldRule {
    FieldRule::new(name, format!("{} table.t2 tr", container))
        .cells(&[".td1", ".td2"])
        .join("\n")
}

pub fn extractor() -> ExtractorConfig {
    ExtractorConfig {
        required_selector: Some(".infotitlediv".to_string()),
        fields: vec![
            FieldRule::new("chinese_name", ".infocname"),
            FieldRule::new("common_name", ".infomore").after("俗名："),
            FieldRule::new("family", "#rightclasssys div a").containing("科"),
            FieldRule::new("genus", "#rightclasssys div a").containing("属"),
            table_rows("description", "#cont_mp11"),
            table_rows("ecology", "#cont_mp12"),
            table_rows("plant_usage", "#cont_mp20"),
            FieldRule::new("image_url", "#imglist img")
                .attr("src")
                .url_scheme("https"),
        ],
    }
}
