//! 构件分类模块
//!
//! 多个独立策略对同一批标注分别识别，结果拼接后按（类型，名称）去重，
//! 冲突时保留尺寸最完整的记录。
//!
//! 设计原则：
//! - 关键词、编号正则、几何、外部模型四个策略互相独立
//! - 所有策略都识别为未知的标注直接丢弃
//! - 外部模型是可选能力接口，未配置不是错误
//! - 两次识别同一文档必须得到相同的构件集合

use crate::core::extractor::DimensionExtractor;
use crate::core::models::{
    Component, ComponentType, DimensionSet, DrawingDocument, Polyline, RecognitionStrategy,
};
use crate::core::standards::StandardsTable;
use crate::core::supplement::DimensionSupplementer;
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 外部模型返回的候选构件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalCandidate {
    /// 类型名（中英文均可，如"梁"/"beam"）
    #[serde(rename = "type")]
    pub type_name: String,
    /// 构件名称
    pub name: String,
    /// 候选尺寸（可部分缺失）
    #[serde(default)]
    pub dimensions: DimensionSet,
}

/// 外部模型能力接口
///
/// 宿主可以不实现（传 None），此时对应策略与管线阶段静默跳过。
/// 网络传输、超时控制都是宿主的责任，核心只要求同步返回候选列表。
pub trait ExternalModelHook {
    /// 对一批样本文本做分类，返回候选构件列表
    fn classify_batch(&self, samples: &[String]) -> Result<Vec<ExternalCandidate>>;
}

/// 从外部模型的自由文本响应中解析候选列表
///
/// 模型经常在JSON前后夹带说明文字，这里截取首个'['到最后']'之间的内容再解析。
pub fn parse_candidates_json(response: &str) -> Result<Vec<ExternalCandidate>> {
    let json_str = extract_json_array(response);
    serde_json::from_str(&json_str)
        .map_err(|e| anyhow::anyhow!("解析外部模型响应失败: {}, 响应内容: {}", e, response))
}

/// 截取响应中的JSON数组部分
fn extract_json_array(response: &str) -> String {
    if let Some(start) = response.find('[') {
        if let Some(end) = response.rfind(']') {
            if end > start {
                return response[start..=end].to_string();
            }
        }
    }
    response.to_string()
}

/// 模拟外部模型（用于测试或离线模式）
pub struct MockModelHook {
    extractor: DimensionExtractor,
}

impl Default for MockModelHook {
    fn default() -> Self {
        Self {
            extractor: DimensionExtractor::new(),
        }
    }
}

impl ExternalModelHook for MockModelHook {
    fn classify_batch(&self, samples: &[String]) -> Result<Vec<ExternalCandidate>> {
        let mut candidates = Vec::new();
        for text in samples {
            let type_name = if text.contains('梁') {
                "梁"
            } else if text.contains('柱') {
                "柱"
            } else if text.contains('墙') {
                "墙"
            } else if text.contains('板') {
                "板"
            } else {
                continue;
            };
            candidates.push(ExternalCandidate {
                type_name: type_name.to_string(),
                name: first_token(text).to_string(),
                dimensions: self.extractor.extract(text),
            });
        }
        Ok(candidates)
    }
}

/// 构件分类器
pub struct ComponentClassifier {
    /// 按类型组织的关键词表（顺序即判定顺序）
    keyword_table: Vec<(ComponentType, Vec<&'static str>)>,
    /// 构件编号正则（长前缀在前）
    code_patterns: Vec<(ComponentType, Regex)>,
    extractor: DimensionExtractor,
    supplementer: DimensionSupplementer,
    /// 混凝土强度等级（材质标记，兼作窗编号的排除条件）
    concrete_grade: Regex,
    /// 几何策略：包围盒长边超过此值判墙
    wall_threshold_mm: f64,
    /// 几何策略：包围盒两边都小于此值判柱
    column_threshold_mm: f64,
}

impl ComponentClassifier {
    /// 创建分类器（词典与正则在构造时注入/编译）
    pub fn new(standards: StandardsTable, neighbor_radius_mm: f64) -> Self {
        let keyword_table = vec![
            (
                ComponentType::Beam,
                vec!["框架梁", "连梁", "次梁", "梁", "KL", "WKL", "LL", "JZL", "beam"],
            ),
            (
                ComponentType::Column,
                vec!["框架柱", "构造柱", "柱", "KZ", "GZ", "column"],
            ),
            (
                ComponentType::Wall,
                vec!["剪力墙", "挡土墙", "墙", "wall"],
            ),
            (
                ComponentType::Slab,
                vec!["楼板", "底板", "板", "LB", "WB", "slab"],
            ),
            (ComponentType::Door, vec!["门", "door"]),
            (ComponentType::Window, vec!["窗", "window"]),
            (ComponentType::Stair, vec!["楼梯", "梯段", "LT", "stair"]),
        ];

        let code = |t, p: &str| (t, Regex::new(p).expect("构件编号正则非法"));
        let code_patterns = vec![
            code(ComponentType::Beam, r"WKL\d+"),
            code(ComponentType::Beam, r"KL\d+"),
            code(ComponentType::Beam, r"JZL\d+"),
            code(ComponentType::Beam, r"LL\d+"),
            code(ComponentType::Column, r"KZ\d+"),
            code(ComponentType::Column, r"GZ\d+"),
            code(ComponentType::Wall, r"DQ\d+"),
            code(ComponentType::Stair, r"LT\d+"),
            code(ComponentType::Stair, r"AT\d+"),
            code(ComponentType::Slab, r"LB\d+"),
            code(ComponentType::Slab, r"WB\d+"),
            code(ComponentType::Wall, r"Q\d+"),
            code(ComponentType::Slab, r"B\d+"),
            code(ComponentType::Column, r"Z\d+"),
            code(ComponentType::Door, r"M\d+"),
            code(ComponentType::Window, r"C\d+"),
            code(ComponentType::Beam, r"L\d+"),
        ];

        Self {
            keyword_table,
            code_patterns,
            extractor: DimensionExtractor::new(),
            supplementer: DimensionSupplementer::new(standards, neighbor_radius_mm),
            concrete_grade: Regex::new(r"C(\d{2})").expect("强度等级正则非法"),
            wall_threshold_mm: 3000.0,
            column_threshold_mm: 1000.0,
        }
    }

    /// 文本分类：关键词优先，其次编号正则，都未命中返回未知
    pub fn classify(&self, text: &str) -> ComponentType {
        let by_keyword = self.classify_by_keywords(text);
        if by_keyword != ComponentType::Unknown {
            return by_keyword;
        }
        self.classify_by_codes(text).map(|(t, _)| t).unwrap_or_default()
    }

    /// 关键词策略分类
    fn classify_by_keywords(&self, text: &str) -> ComponentType {
        for (component_type, keywords) in &self.keyword_table {
            if keywords.iter().any(|k| keyword_hits(text, k)) {
                return *component_type;
            }
        }
        ComponentType::Unknown
    }

    /// 编号策略分类，同时返回命中的编号文本（作为构件名）
    fn classify_by_codes(&self, text: &str) -> Option<(ComponentType, String)> {
        for (component_type, pattern) in &self.code_patterns {
            if let Some(m) = pattern.find(text) {
                // C30 这类强度等级是材质不是窗编号
                if *component_type == ComponentType::Window && is_concrete_grade(m.as_str()) {
                    continue;
                }
                return Some((*component_type, m.as_str().to_string()));
            }
        }
        None
    }

    /// 专业词典校验：名称是否像该类型的专业叫法/编号
    pub fn matches_terminology(&self, component_type: ComponentType, name: &str) -> bool {
        if let Some(keywords) = self
            .keyword_table
            .iter()
            .find(|(t, _)| *t == component_type)
            .map(|(_, k)| k)
        {
            if keywords.iter().any(|k| keyword_hits(name, k)) {
                return true;
            }
        }
        self.code_patterns
            .iter()
            .filter(|(t, _)| *t == component_type)
            .any(|(_, p)| p.is_match(name))
    }

    /// 材质标记检测（强度等级或材料关键词）
    pub fn detect_material(&self, text: &str) -> Option<String> {
        if let Some(caps) = self.concrete_grade.captures(text) {
            let grade: u32 = caps[1].parse().unwrap_or(0);
            if (20..=80).contains(&grade) {
                return Some(format!("C{}", grade));
            }
        }
        for material in ["钢筋混凝土", "混凝土", "砌块", "砖", "钢", "木"] {
            if text.contains(material) {
                return Some(material.to_string());
            }
        }
        None
    }

    /// 对整个文档执行多策略识别，返回去重后的构件列表
    pub fn recognize(
        &self,
        document: &DrawingDocument,
        hook: Option<&dyn ExternalModelHook>,
        external_sample_limit: usize,
    ) -> Vec<Component> {
        let mut all = Vec::new();

        all.extend(self.recognize_by_keywords(document));
        all.extend(self.recognize_by_codes(document));
        all.extend(self.recognize_by_geometry(document));
        all.extend(self.recognize_by_external(document, hook, external_sample_limit));

        let merged = merge_components(all);
        tracing::info!(count = merged.len(), "多策略识别完成");
        merged
    }

    /// 关键词策略
    fn recognize_by_keywords(&self, document: &DrawingDocument) -> Vec<Component> {
        self.recognize_text_strategy(document, RecognitionStrategy::Keyword, |text| {
            let t = self.classify_by_keywords(text);
            if t == ComponentType::Unknown {
                None
            } else {
                // 名称优先用编号，没有编号用首词元
                let name = self
                    .classify_by_codes(text)
                    .map(|(_, code)| code)
                    .unwrap_or_else(|| first_token(text).to_string());
                Some((t, name))
            }
        })
    }

    /// 编号策略（独立于关键词，兜住只有裸编号的标注）
    fn recognize_by_codes(&self, document: &DrawingDocument) -> Vec<Component> {
        self.recognize_text_strategy(document, RecognitionStrategy::CodePattern, |text| {
            self.classify_by_codes(text)
        })
    }

    /// 文本类策略的公共骨架：分类 + 提取 + 邻近补全
    fn recognize_text_strategy(
        &self,
        document: &DrawingDocument,
        strategy: RecognitionStrategy,
        classify: impl Fn(&str) -> Option<(ComponentType, String)>,
    ) -> Vec<Component> {
        let mut components = Vec::new();

        for annotation in &document.annotations {
            let Some((component_type, name)) = classify(&annotation.text) else {
                continue;
            };

            let mut component =
                Component::new(component_type, name, Some(annotation.id.clone()), strategy);
            let dims = self.extractor.extract(&annotation.text);
            component.dimensions = self.supplementer.supplement(
                &dims,
                component_type,
                Some(annotation),
                &document.annotations,
            );
            component.material = self.detect_material(&annotation.text);
            components.push(component);
        }

        components
    }

    /// 几何策略：闭合四点多段线按包围盒判墙/柱
    fn recognize_by_geometry(&self, document: &DrawingDocument) -> Vec<Component> {
        let mut components = Vec::new();

        for (index, polyline) in document.polylines.iter().enumerate() {
            let Some((component_type, dims)) = self.classify_polyline(polyline) else {
                continue;
            };

            let name = format!("{}{}", component_type, index + 1);
            let mut component =
                Component::new(component_type, name, None, RecognitionStrategy::Geometry);
            component.dimensions =
                self.supplementer
                    .supplement(&dims, component_type, None, &[]);
            components.push(component);
        }

        components
    }

    /// 单条多段线的几何判定
    fn classify_polyline(&self, polyline: &Polyline) -> Option<(ComponentType, DimensionSet)> {
        if !polyline.closed || polyline.points.len() != 4 {
            return None;
        }

        let xs: Vec<f64> = polyline.points.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = polyline.points.iter().map(|p| p.y).collect();
        let dx = xs.iter().cloned().fold(f64::MIN, f64::max)
            - xs.iter().cloned().fold(f64::MAX, f64::min);
        let dy = ys.iter().cloned().fold(f64::MIN, f64::max)
            - ys.iter().cloned().fold(f64::MAX, f64::min);
        let long = dx.max(dy);
        let short = dx.min(dy);

        if long > self.wall_threshold_mm {
            let mut dims = DimensionSet::empty();
            dims.width = Some(short);
            dims.length = Some(long);
            Some((ComponentType::Wall, dims))
        } else if long < self.column_threshold_mm {
            let mut dims = DimensionSet::empty();
            dims.width = Some(dx);
            dims.height = Some(dy);
            Some((ComponentType::Column, dims))
        } else {
            None
        }
    }

    /// 外部模型策略
    fn recognize_by_external(
        &self,
        document: &DrawingDocument,
        hook: Option<&dyn ExternalModelHook>,
        sample_limit: usize,
    ) -> Vec<Component> {
        let Some(hook) = hook else {
            return Vec::new();
        };

        let samples: Vec<String> = document
            .annotations
            .iter()
            .take(sample_limit)
            .map(|a| a.text.clone())
            .collect();

        let candidates = match hook.classify_batch(&samples) {
            Ok(c) => c,
            Err(e) => {
                // 外部模型失败只降级，不中断识别
                tracing::warn!("外部模型调用失败: {}", e);
                return Vec::new();
            }
        };

        candidates
            .into_iter()
            .filter_map(|candidate| {
                let component_type = ComponentType::from_label(&candidate.type_name);
                if component_type == ComponentType::Unknown {
                    return None;
                }
                let mut component = Component::new(
                    component_type,
                    candidate.name,
                    None,
                    RecognitionStrategy::ExternalModel,
                );
                component.dimensions = self.supplementer.supplement(
                    &candidate.dimensions,
                    component_type,
                    None,
                    &[],
                );
                component.material = self.detect_material(&component.name);
                Some(component)
            })
            .collect()
    }
}

/// 关键词命中判定
///
/// 全大写的编号前缀要求紧跟数字，避免误伤普通英文单词（如 wall 中的 LL）。
fn keyword_hits(text: &str, keyword: &str) -> bool {
    let is_code_prefix = !keyword.is_empty() && keyword.chars().all(|c| c.is_ascii_uppercase());
    if is_code_prefix {
        text.match_indices(keyword).any(|(i, _)| {
            text[i + keyword.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
        })
    } else {
        text.to_lowercase().contains(&keyword.to_lowercase())
    }
}

/// 判断编号文本是否其实是混凝土强度等级（C20~C80）
fn is_concrete_grade(code: &str) -> bool {
    code.strip_prefix('C')
        .and_then(|n| n.parse::<u32>().ok())
        .is_some_and(|n| (20..=80).contains(&n))
}

/// 文本首词元（作为兜底构件名）
fn first_token(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or(text)
}

/// 按（类型，名称）去重合并，保留尺寸最完整的记录
fn merge_components(components: Vec<Component>) -> Vec<Component> {
    let mut merged: HashMap<(ComponentType, String), Component> = HashMap::new();

    for component in components {
        let key = (component.component_type, component.name.clone());
        match merged.entry(key) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                // 记录所有来源标注
                for id in &component.source_annotation_ids {
                    if !existing.source_annotation_ids.contains(id) {
                        existing.source_annotation_ids.push(id.clone());
                    }
                }
                if component.dimensions.filled_count() > existing.dimensions.filled_count() {
                    existing.dimensions = component.dimensions;
                    existing.meta = component.meta;
                }
                if existing.material.is_none() {
                    existing.material = component.material;
                }
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(component);
            }
        }
    }

    let mut result: Vec<Component> = merged.into_values().collect();
    // 固定输出顺序，保证同一文档两次识别结果一致
    result.sort_by(|a, b| {
        (a.component_type.tag(), a.name.as_str()).cmp(&(b.component_type.tag(), b.name.as_str()))
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Annotation, Position};

    fn classifier() -> ComponentClassifier {
        ComponentClassifier::new(StandardsTable::builtin(), 500.0)
    }

    #[test]
    fn test_classify_by_keyword() {
        let c = classifier();
        assert_eq!(c.classify("剪力墙 200厚"), ComponentType::Wall);
        assert_eq!(c.classify("框架梁 300×600"), ComponentType::Beam);
        assert_eq!(c.classify("见结构说明"), ComponentType::Unknown);
    }

    #[test]
    fn test_classify_bare_code() {
        let c = classifier();
        assert_eq!(c.classify("KL3"), ComponentType::Beam);
        assert_eq!(c.classify("KZ12"), ComponentType::Column);
        assert_eq!(c.classify("Q2"), ComponentType::Wall);
        assert_eq!(c.classify("M1021"), ComponentType::Door);
        assert_eq!(c.classify("C1524"), ComponentType::Window);
    }

    #[test]
    fn test_code_prefix_not_in_english_word() {
        let c = classifier();
        // wall 里的 ll 不能被当成连梁编号
        assert_eq!(c.classify("wall 200"), ComponentType::Wall);
    }

    #[test]
    fn test_concrete_grade_is_not_window() {
        let c = classifier();
        assert_eq!(c.classify("C30"), ComponentType::Unknown);
        assert_eq!(c.detect_material("C30混凝土"), Some("C30".to_string()));
    }

    #[test]
    fn test_recognize_dedups_across_strategies() {
        let c = classifier();
        // 同一标注会被关键词和编号两个策略同时识别，必须合并成一个构件
        let doc = DrawingDocument {
            annotations: vec![Annotation::new("a1", "框架梁KL1 300×600", 0.0, 0.0)],
            polylines: Vec::new(),
        };
        let components = c.recognize(&doc, None, 50);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].component_type, ComponentType::Beam);
        assert_eq!(components[0].name, "KL1");
    }

    #[test]
    fn test_recognize_is_deterministic() {
        let c = classifier();
        let doc = DrawingDocument {
            annotations: vec![
                Annotation::new("a1", "KL1 300×600", 0.0, 0.0),
                Annotation::new("a2", "KZ1 500×500", 9000.0, 0.0),
                Annotation::new("a3", "剪力墙 200厚", 18000.0, 0.0),
            ],
            polylines: Vec::new(),
        };
        let first = c.recognize(&doc, None, 50);
        let second = c.recognize(&doc, None, 50);
        let key = |v: &[Component]| -> Vec<(ComponentType, String)> {
            v.iter().map(|c| (c.component_type, c.name.clone())).collect()
        };
        assert_eq!(key(&first), key(&second));
    }

    #[test]
    fn test_geometry_wall_and_column() {
        let c = classifier();
        let wall = Polyline {
            points: vec![
                Position::new(0.0, 0.0),
                Position::new(6000.0, 0.0),
                Position::new(6000.0, 200.0),
                Position::new(0.0, 200.0),
            ],
            closed: true,
        };
        let column = Polyline {
            points: vec![
                Position::new(0.0, 0.0),
                Position::new(500.0, 0.0),
                Position::new(500.0, 500.0),
                Position::new(0.0, 500.0),
            ],
            closed: true,
        };
        let doc = DrawingDocument {
            annotations: Vec::new(),
            polylines: vec![wall, column],
        };
        let components = c.recognize(&doc, None, 50);
        assert_eq!(components.len(), 2);

        let wall = components
            .iter()
            .find(|c| c.component_type == ComponentType::Wall)
            .unwrap();
        assert_eq!(wall.dimensions.width, Some(200.0));
        assert_eq!(wall.dimensions.length, Some(6000.0));
        assert_eq!(wall.dimensions.height, Some(3000.0));

        let column = components
            .iter()
            .find(|c| c.component_type == ComponentType::Column)
            .unwrap();
        assert_eq!(column.dimensions.width, Some(500.0));
        assert_eq!(column.dimensions.length, Some(3000.0));
    }

    #[test]
    fn test_external_hook_candidates_merged() {
        let c = classifier();
        let doc = DrawingDocument {
            annotations: vec![Annotation::new("a1", "梁 300×600", 0.0, 0.0)],
            polylines: Vec::new(),
        };
        let hook = MockModelHook::default();
        let components = c.recognize(&doc, Some(&hook), 50);
        assert!(!components.is_empty());
        assert!(components.iter().all(|c| c.component_type == ComponentType::Beam));
    }

    #[test]
    fn test_parse_candidates_json_with_noise() {
        let response = r#"根据分析，识别结果如下：
[{"type": "梁", "name": "KL1", "dimensions": {"width": 300.0, "height": 600.0}}]
以上。"#;
        let candidates = parse_candidates_json(response).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "KL1");
        assert_eq!(candidates[0].dimensions.width, Some(300.0));
    }

    #[test]
    fn test_terminology_match() {
        let c = classifier();
        assert!(c.matches_terminology(ComponentType::Beam, "KL1"));
        assert!(c.matches_terminology(ComponentType::Wall, "剪力墙"));
        assert!(!c.matches_terminology(ComponentType::Beam, "未命名"));
    }
}
