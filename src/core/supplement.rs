//! 尺寸补全模块
//!
//! 三个独立来源按严格优先级合并缺失尺寸：
//! 已提取尺寸 > 邻近标注推导 > 标准表默认值。
//! 低优先级来源永远不覆盖高优先级来源已写入的字段。

use crate::core::extractor::DimensionExtractor;
use crate::core::models::{Annotation, ComponentType, DimensionField, DimensionSet};
use crate::core::standards::StandardsTable;
use regex::Regex;

/// 尺寸补全器
pub struct DimensionSupplementer {
    standards: StandardsTable,
    extractor: DimensionExtractor,
    /// 邻近标注搜索半径（毫米，图纸平面欧氏距离）
    neighbor_radius_mm: f64,
    /// 跨度标记 L=6000 / L=7.2
    span_token: Regex,
}

impl DimensionSupplementer {
    /// 创建补全器
    pub fn new(standards: StandardsTable, neighbor_radius_mm: f64) -> Self {
        Self {
            standards,
            extractor: DimensionExtractor::new(),
            neighbor_radius_mm,
            span_token: Regex::new(r"[Ll]\s*=\s*(\d+(?:\.\d+)?)").expect("跨度标记正则非法"),
        }
    }

    /// 补全缺失尺寸
    ///
    /// 尺寸已对该类型完整时原样返回（幂等短路）。annotation 为空时
    /// （几何/外部来源的构件）跳过邻近搜索与跨度解析，仅套用标准默认值。
    pub fn supplement(
        &self,
        dims: &DimensionSet,
        component_type: ComponentType,
        annotation: Option<&Annotation>,
        neighbors: &[Annotation],
    ) -> DimensionSet {
        let mut result = dims.clone();

        // 宽/高/长齐备（或直径+长度）时不做任何查找，原样返回
        let fully_filled = (result.width.is_some()
            && result.height.is_some()
            && result.length.is_some())
            || (result.diameter.is_some() && result.length.is_some());
        if fully_filled {
            return result;
        }

        // 第二优先级：邻近标注
        if let Some(ann) = annotation {
            for neighbor in neighbors {
                if neighbor.id == ann.id {
                    continue;
                }
                if ann.position.distance_2d(&neighbor.position) > self.neighbor_radius_mm {
                    continue;
                }
                let neighbor_dims = self.extractor.extract(&neighbor.text);
                if !neighbor_dims.is_empty() {
                    tracing::debug!(
                        neighbor_id = %neighbor.id,
                        "从邻近标注补全尺寸"
                    );
                    result.merge_missing(&neighbor_dims);
                }
            }
        }

        // 第三优先级：标准表默认值
        let text = annotation.map(|a| a.text.as_str()).unwrap_or("");
        self.apply_standard_defaults(&mut result, component_type, text);

        // 圆截面不变量
        if let Some(d) = result.diameter {
            result.set_diameter(d);
        }

        result
    }

    /// 按构件类型套用标准默认值（只填缺失字段）
    fn apply_standard_defaults(
        &self,
        dims: &mut DimensionSet,
        component_type: ComponentType,
        text: &str,
    ) {
        use ComponentType::*;
        use DimensionField::*;

        let has_section =
            (dims.width.is_some() && dims.height.is_some()) || dims.diameter.is_some();

        match component_type {
            Beam => {
                if has_section && dims.length.is_none() {
                    // 文本带跨度标记时优先用标记值
                    let length = self
                        .parse_span(text)
                        .or_else(|| self.standards.default_value(Beam, Length));
                    dims.length = length;
                }
            }
            Column => {
                if has_section && dims.length.is_none() {
                    dims.length = self.standards.default_value(Column, Length);
                }
            }
            Wall => {
                // 有厚度的墙：缺层高补默认层高，缺长度按厚度分档
                if dims.width.is_some() && dims.diameter.is_none() {
                    let thickness = dims.width.unwrap_or(0.0);
                    if dims.height.is_none() {
                        dims.height = self.standards.default_value(Wall, Height);
                    }
                    if dims.length.is_none() {
                        dims.length = Some(if thickness < 150.0 { 3000.0 } else { 6000.0 });
                    }
                }
            }
            Slab => {
                // 单值且小于200按板厚理解，默认一个开间的平面尺寸
                if dims.filled_count() == 1 && dims.diameter.is_none() {
                    let value = dims.width.or(dims.height).or(dims.length).unwrap_or(0.0);
                    if value < 200.0 {
                        dims.width = self.standards.default_value(Slab, Width);
                        dims.height = Some(value);
                        dims.length = self.standards.default_value(Slab, Length);
                    }
                }
            }
            Door => {
                if dims.width.is_some() && dims.height.is_some() && dims.length.is_none() {
                    dims.length = self.standards.default_value(Door, Length);
                }
            }
            Window => {
                if dims.width.is_some() && dims.height.is_some() && dims.length.is_none() {
                    dims.length = self.standards.default_value(Window, Length);
                }
            }
            Stair => {
                // 只有梯段宽时默认梯段长与层高
                if dims.width.is_some()
                    && dims.height.is_none()
                    && dims.length.is_none()
                    && dims.diameter.is_none()
                {
                    dims.length = self.standards.default_value(Stair, Length);
                    dims.height = self.standards.default_value(Stair, Height);
                }
            }
            Unknown => {}
        }
    }

    /// 解析跨度标记；小于100的值按米理解（×1000）
    fn parse_span(&self, text: &str) -> Option<f64> {
        let caps = self.span_token.captures(text)?;
        let value: f64 = caps.get(1)?.as_str().parse().ok()?;
        Some(if value < 100.0 { value * 1000.0 } else { value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supplementer() -> DimensionSupplementer {
        DimensionSupplementer::new(StandardsTable::builtin(), 500.0)
    }

    fn ann(id: &str, text: &str, x: f64, y: f64) -> Annotation {
        Annotation::new(id, text, x, y)
    }

    #[test]
    fn test_idempotent_when_complete() {
        let s = supplementer();
        let dims = DimensionSet {
            width: Some(300.0),
            height: Some(600.0),
            length: Some(6000.0),
            diameter: None,
        };
        let a = ann("a1", "KL1 300×600×6000", 0.0, 0.0);
        let out = s.supplement(&dims, ComponentType::Beam, Some(&a), &[]);
        assert_eq!(out, dims);
    }

    #[test]
    fn test_extracted_wins_over_neighbor() {
        let s = supplementer();
        let dims = DimensionSet {
            width: Some(250.0),
            ..Default::default()
        };
        let a = ann("a1", "梁 250", 0.0, 0.0);
        let neighbors = vec![a.clone(), ann("a2", "300×600", 100.0, 0.0)];
        let out = s.supplement(&dims, ComponentType::Beam, Some(&a), &neighbors);
        // 原始提取值保持不变，高度由邻近标注补入
        assert_eq!(out.width, Some(250.0));
        assert_eq!(out.height, Some(600.0));
    }

    #[test]
    fn test_neighbor_outside_radius_ignored() {
        let s = supplementer();
        let dims = DimensionSet {
            width: Some(250.0),
            ..Default::default()
        };
        let a = ann("a1", "梁 250", 0.0, 0.0);
        let neighbors = vec![ann("a2", "300×600", 2000.0, 0.0)];
        let out = s.supplement(&dims, ComponentType::Beam, Some(&a), &neighbors);
        assert_eq!(out.height, None);
    }

    #[test]
    fn test_beam_default_length() {
        let s = supplementer();
        let dims = DimensionSet {
            width: Some(300.0),
            height: Some(600.0),
            ..Default::default()
        };
        let a = ann("a1", "KL1 300×600", 0.0, 0.0);
        let out = s.supplement(&dims, ComponentType::Beam, Some(&a), &[]);
        assert_eq!(out.length, Some(6000.0));
    }

    #[test]
    fn test_beam_span_token_meters() {
        let s = supplementer();
        let dims = DimensionSet {
            width: Some(300.0),
            height: Some(600.0),
            ..Default::default()
        };
        let a = ann("a1", "KL2 300×600 L=7.2", 0.0, 0.0);
        let out = s.supplement(&dims, ComponentType::Beam, Some(&a), &[]);
        assert_eq!(out.length, Some(7200.0));
    }

    #[test]
    fn test_column_round_default_length() {
        let s = supplementer();
        let mut dims = DimensionSet::empty();
        dims.set_diameter(500.0);
        let out = s.supplement(&dims, ComponentType::Column, None, &[]);
        assert_eq!(out.length, Some(3000.0));
        assert_eq!(out.diameter, Some(500.0));
        assert_eq!(out.width, Some(500.0));
    }

    #[test]
    fn test_wall_thickness_tiers() {
        let s = supplementer();

        let thin = DimensionSet {
            width: Some(120.0),
            ..Default::default()
        };
        let out = s.supplement(&thin, ComponentType::Wall, None, &[]);
        assert_eq!(out.height, Some(3000.0));
        assert_eq!(out.length, Some(3000.0));

        let thick = DimensionSet {
            width: Some(200.0),
            ..Default::default()
        };
        let out = s.supplement(&thick, ComponentType::Wall, None, &[]);
        assert_eq!(out.height, Some(3000.0));
        assert_eq!(out.length, Some(6000.0));
    }

    #[test]
    fn test_slab_single_value_as_thickness() {
        let s = supplementer();
        let dims = DimensionSet {
            width: Some(100.0),
            ..Default::default()
        };
        let out = s.supplement(&dims, ComponentType::Slab, None, &[]);
        assert_eq!(out.height, Some(100.0));
        assert_eq!(out.width, Some(3000.0));
        assert_eq!(out.length, Some(6000.0));
    }

    #[test]
    fn test_stair_width_only() {
        let s = supplementer();
        let dims = DimensionSet {
            width: Some(1200.0),
            ..Default::default()
        };
        let out = s.supplement(&dims, ComponentType::Stair, None, &[]);
        assert_eq!(out.length, Some(3000.0));
        assert_eq!(out.height, Some(3000.0));
    }

    #[test]
    fn test_door_window_thickness_defaults() {
        let s = supplementer();
        let dims = DimensionSet {
            width: Some(900.0),
            height: Some(2100.0),
            ..Default::default()
        };
        let door = s.supplement(&dims, ComponentType::Door, None, &[]);
        assert_eq!(door.length, Some(40.0));
        let window = s.supplement(&dims, ComponentType::Window, None, &[]);
        assert_eq!(window.length, Some(50.0));
    }
}
