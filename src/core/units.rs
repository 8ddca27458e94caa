//! 单位归一化模块
//!
//! 在文法匹配之前，把混合单位（m/cm/inch/foot）的数值统一改写为毫米，
//! 并去掉毫米后缀本身。无单位后缀的数字保持原样，无法解析的单位原样放行。

use regex::Regex;

/// 单位归一化器
pub struct UnitNormalizer {
    /// 数值+单位后缀的改写模式
    pattern: Regex,
}

impl Default for UnitNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitNormalizer {
    /// 创建归一化器
    pub fn new() -> Self {
        // 长单位在前（mm/cm 先于 m，inch 先于 in），避免被短单位截走。
        // regex 不支持前瞻，用尾部捕获组阻止改写更长词元（如 300m2）。
        let pattern = Regex::new(
            r"(?P<num>\d+(?:\.\d+)?)\s*(?P<unit>mm|毫米|cm|厘米|inch|in|英寸|foot|ft|英尺|m|米)(?P<tail>$|[^0-9A-Za-z])",
        )
        .expect("单位改写正则非法");

        Self { pattern }
    }

    /// 把文本中的带单位数值统一改写为毫米数值
    pub fn normalize(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, |caps: &regex::Captures| {
                let num: f64 = caps["num"].parse().unwrap_or(0.0);
                let factor = unit_factor(&caps["unit"]);
                let tail = caps.name("tail").map(|m| m.as_str()).unwrap_or("");
                format!("{}{}", format_mm(num * factor), tail)
            })
            .into_owned()
    }
}

/// 单位到毫米的换算系数
fn unit_factor(unit: &str) -> f64 {
    match unit {
        "mm" | "毫米" => 1.0,
        "cm" | "厘米" => 10.0,
        "m" | "米" => 1000.0,
        "in" | "inch" | "英寸" => 25.4,
        "ft" | "foot" | "英尺" => 304.8,
        _ => 1.0,
    }
}

/// 毫米数值的文本形式：整数值不带小数点
fn format_mm(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{}", value.round() as i64)
    } else {
        format!("{}", value)
    }
}
