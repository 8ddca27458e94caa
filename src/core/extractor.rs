//! 尺寸提取模块
//!
//! 对单位归一化后的标注文本套用一组有序标注文法，返回稀疏尺寸集合。
//!
//! 设计原则：
//! - 文法按优先级排列，首个命中即返回（优先级本身就是正确性约定）
//! - 直径 > 三值 > 两值 > b×h标注 > 括号对 > 逗号列表 > 连字符对 > 裸数值
//! - 连字符对在文本含楼层限定词时禁用，避免把"2-5层"读成截面
//! - 任何文本都不会报错，匹配不到就返回空集合

use crate::core::models::DimensionSet;
use crate::core::units::UnitNormalizer;
use regex::Regex;

/// 文法类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GrammarKind {
    /// φ500 / 直径500，可带长度（φ500×2000）
    Diameter,
    /// 300×600×6000
    Triple,
    /// 300×600
    Pair,
    /// b×h=300×600
    LabeledPair,
    /// 300(600)
    ParenPair,
    /// 300,600[,6000]
    CommaList,
    /// 300-600（楼层限定词出现时禁用）
    DashPair,
    /// L=6000 / H=3000 / B=300
    LabeledSingle,
    /// 裸数值，按上下文判定直径或宽度
    BareNumber,
}

/// 单条标注文法：标签 + 模式 + 处理类别
struct NotationRule {
    name: &'static str,
    kind: GrammarKind,
    regex: Regex,
}

/// 尺寸提取器
pub struct DimensionExtractor {
    units: UnitNormalizer,
    /// 有序文法表，顺序即优先级
    rules: Vec<NotationRule>,
    /// 楼层限定词（禁用连字符文法）
    floor_guard: Regex,
    /// 圆形构件上下文（裸数值按直径处理）
    round_context: Regex,
}

impl Default for DimensionExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl DimensionExtractor {
    /// 创建提取器（文法表在构造时编译完成）
    pub fn new() -> Self {
        let rule = |name, kind, pattern: &str| NotationRule {
            name,
            kind,
            regex: Regex::new(pattern).expect("标注文法正则非法"),
        };

        let rules = vec![
            rule(
                "diameter",
                GrammarKind::Diameter,
                r"(?:[φΦ⌀∅]|直径)\s*(\d+(?:\.\d+)?)(?:\s*[×xX*]\s*(\d+(?:\.\d+)?))?",
            ),
            rule(
                "triple",
                GrammarKind::Triple,
                r"(\d+(?:\.\d+)?)\s*[×xX*]\s*(\d+(?:\.\d+)?)\s*[×xX*]\s*(\d+(?:\.\d+)?)",
            ),
            rule(
                "pair",
                GrammarKind::Pair,
                r"(\d+(?:\.\d+)?)\s*[×xX*]\s*(\d+(?:\.\d+)?)",
            ),
            rule(
                "labeled_pair",
                GrammarKind::LabeledPair,
                r"[bB]\s*[×xX*]\s*[hH]\s*=\s*(\d+(?:\.\d+)?)\s*[×xX*]\s*(\d+(?:\.\d+)?)",
            ),
            rule(
                "paren_pair",
                GrammarKind::ParenPair,
                r"(\d+(?:\.\d+)?)\s*[(（]\s*(\d+(?:\.\d+)?)\s*[)）]",
            ),
            rule(
                "comma_list",
                GrammarKind::CommaList,
                r"(\d+(?:\.\d+)?)\s*[,，]\s*(\d+(?:\.\d+)?)(?:\s*[,，]\s*(\d+(?:\.\d+)?))?",
            ),
            rule(
                "dash_pair",
                GrammarKind::DashPair,
                r"(\d+(?:\.\d+)?)\s*[-－—~]\s*(\d+(?:\.\d+)?)",
            ),
            rule(
                "labeled_single",
                GrammarKind::LabeledSingle,
                r"([LlHhBbWw])\s*=\s*(\d+(?:\.\d+)?)",
            ),
            rule(
                "bare_number",
                GrammarKind::BareNumber,
                r"(\d{2,}(?:\.\d+)?)",
            ),
        ];

        Self {
            units: UnitNormalizer::new(),
            rules,
            floor_guard: Regex::new(r"层|楼|[Ff]loor|\dF").expect("楼层限定词正则非法"),
            round_context: Regex::new(r"桩|圆").expect("圆形上下文正则非法"),
        }
    }

    /// 提取尺寸：首个命中的文法决定结果，全部未命中返回空集合
    pub fn extract(&self, text: &str) -> DimensionSet {
        let normalized = self.units.normalize(text);

        for rule in &self.rules {
            if let Some(dims) = self.apply(rule, &normalized) {
                tracing::debug!(grammar = rule.name, text, "尺寸文法命中");
                return dims;
            }
        }

        DimensionSet::empty()
    }

    /// 套用单条文法，未命中（或被限定词禁用）返回 None 继续级联
    fn apply(&self, rule: &NotationRule, text: &str) -> Option<DimensionSet> {
        let caps = rule.regex.captures(text)?;
        let num = |i: usize| -> Option<f64> { caps.get(i)?.as_str().parse().ok() };

        let mut dims = DimensionSet::empty();
        match rule.kind {
            GrammarKind::Diameter => {
                dims.set_diameter(num(1)?);
                if let Some(l) = num(2) {
                    dims.length = Some(l);
                }
            }
            GrammarKind::Triple => {
                dims.width = Some(num(1)?);
                dims.height = Some(num(2)?);
                dims.length = Some(num(3)?);
            }
            GrammarKind::Pair | GrammarKind::LabeledPair | GrammarKind::ParenPair => {
                dims.width = Some(num(1)?);
                dims.height = Some(num(2)?);
            }
            GrammarKind::CommaList => {
                dims.width = Some(num(1)?);
                dims.height = Some(num(2)?);
                if let Some(l) = num(3) {
                    dims.length = Some(l);
                }
            }
            GrammarKind::DashPair => {
                // "2-5层"这类楼层区间不是截面尺寸
                if self.floor_guard.is_match(text) {
                    return None;
                }
                dims.width = Some(num(1)?);
                dims.height = Some(num(2)?);
            }
            GrammarKind::LabeledSingle => {
                let value = num(2)?;
                match caps.get(1)?.as_str() {
                    "L" | "l" => dims.length = Some(value),
                    "H" | "h" => dims.height = Some(value),
                    _ => dims.width = Some(value),
                }
            }
            GrammarKind::BareNumber => {
                // 过小的裸数值多半是编号或层数残留，跳过找第一个可信值
                let value = rule
                    .regex
                    .find_iter(text)
                    .filter_map(|m| m.as_str().parse::<f64>().ok())
                    .find(|v| *v >= 50.0)?;
                if self.round_context.is_match(text) {
                    dims.set_diameter(value);
                } else {
                    dims.width = Some(value);
                }
            }
        }

        Some(dims)
    }
}
