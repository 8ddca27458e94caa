//! 构件尺寸标准表
//!
//! 静态领域知识：各构件类型的合法尺寸区间、常用规格、兜底默认值。
//! 数值取自常用建筑模数实践，表本身在构造时注入，便于测试替换。

use crate::core::models::{ComponentType, DimensionField};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 合法尺寸区间（毫米）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandardRange {
    pub min: f64,
    pub max: f64,
}

impl StandardRange {
    /// 是否在区间内
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// 是否超出区间2倍以上（升级为错误）
    pub fn severely_out(&self, value: f64) -> bool {
        value > self.max * 2.0 || value < self.min / 2.0
    }
}

/// 单一构件类型的标准数据
#[derive(Debug, Clone, Default)]
pub struct TypeStandard {
    /// 各字段合法区间
    pub ranges: HashMap<DimensionField, StandardRange>,
    /// 各字段常用规格
    pub common_sizes: HashMap<DimensionField, Vec<f64>>,
    /// 各字段无条件兜底默认值
    pub defaults: HashMap<DimensionField, f64>,
}

/// 标准表
#[derive(Debug, Clone)]
pub struct StandardsTable {
    entries: HashMap<ComponentType, TypeStandard>,
}

impl Default for StandardsTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl StandardsTable {
    /// 内置标准数据
    pub fn builtin() -> Self {
        use ComponentType::*;
        use DimensionField::*;

        let mut entries = HashMap::new();

        entries.insert(
            Beam,
            type_standard(
                &[(Width, 100.0, 1000.0), (Height, 200.0, 2000.0), (Length, 1000.0, 12000.0)],
                &[
                    (Width, &[200.0, 250.0, 300.0, 350.0, 400.0]),
                    (Height, &[400.0, 500.0, 600.0, 700.0, 800.0]),
                    (Length, &[3000.0, 4500.0, 6000.0, 7200.0, 9000.0]),
                ],
                &[(Length, 6000.0)],
            ),
        );

        entries.insert(
            Column,
            type_standard(
                &[
                    (Width, 200.0, 2000.0),
                    (Height, 200.0, 2000.0),
                    (Length, 2000.0, 6000.0),
                    (Diameter, 300.0, 2000.0),
                ],
                &[
                    (Width, &[300.0, 400.0, 500.0, 600.0, 800.0]),
                    (Height, &[300.0, 400.0, 500.0, 600.0, 800.0]),
                    (Length, &[2800.0, 3000.0, 3300.0, 3600.0, 4500.0]),
                    (Diameter, &[400.0, 500.0, 600.0, 800.0]),
                ],
                &[(Length, 3000.0)],
            ),
        );

        entries.insert(
            Wall,
            type_standard(
                &[(Width, 100.0, 500.0), (Height, 2000.0, 6000.0), (Length, 1000.0, 20000.0)],
                &[
                    (Width, &[100.0, 120.0, 150.0, 180.0, 200.0, 240.0, 250.0, 300.0, 370.0]),
                    (Height, &[2800.0, 3000.0, 3600.0, 4500.0]),
                    (Length, &[3000.0, 4500.0, 6000.0]),
                ],
                &[(Height, 3000.0)],
            ),
        );

        entries.insert(
            Slab,
            type_standard(
                &[(Width, 1000.0, 12000.0), (Height, 60.0, 500.0), (Length, 1000.0, 12000.0)],
                &[
                    (Width, &[3000.0, 3600.0, 6000.0, 7200.0]),
                    (Height, &[80.0, 100.0, 120.0, 150.0, 180.0, 200.0]),
                    (Length, &[3000.0, 3600.0, 6000.0, 7200.0]),
                ],
                &[(Width, 3000.0), (Length, 6000.0)],
            ),
        );

        entries.insert(
            Door,
            type_standard(
                &[(Width, 600.0, 3000.0), (Height, 1800.0, 3000.0), (Length, 20.0, 120.0)],
                &[
                    (Width, &[700.0, 800.0, 900.0, 1000.0, 1200.0, 1500.0]),
                    (Height, &[2000.0, 2100.0, 2400.0]),
                    (Length, &[40.0, 50.0]),
                ],
                &[(Length, 40.0)],
            ),
        );

        entries.insert(
            Window,
            type_standard(
                &[(Width, 450.0, 6000.0), (Height, 450.0, 3000.0), (Length, 20.0, 120.0)],
                &[
                    (Width, &[600.0, 900.0, 1200.0, 1500.0, 1800.0, 2400.0]),
                    (Height, &[600.0, 900.0, 1200.0, 1500.0, 1800.0]),
                    (Length, &[50.0, 80.0]),
                ],
                &[(Length, 50.0)],
            ),
        );

        entries.insert(
            Stair,
            type_standard(
                &[(Width, 900.0, 3000.0), (Height, 2000.0, 6000.0), (Length, 2000.0, 8000.0)],
                &[
                    (Width, &[1000.0, 1100.0, 1200.0, 1500.0]),
                    (Height, &[2800.0, 3000.0, 3300.0]),
                    (Length, &[3000.0, 3600.0, 4200.0]),
                ],
                &[(Length, 3000.0), (Height, 3000.0)],
            ),
        );

        Self { entries }
    }

    /// 用自定义数据构建（测试替换用）
    pub fn with_entries(entries: HashMap<ComponentType, TypeStandard>) -> Self {
        Self { entries }
    }

    /// 查询合法区间
    pub fn range(&self, component_type: ComponentType, field: DimensionField) -> Option<StandardRange> {
        self.entries
            .get(&component_type)
            .and_then(|s| s.ranges.get(&field))
            .copied()
    }

    /// 查询常用规格列表
    pub fn common_sizes(&self, component_type: ComponentType, field: DimensionField) -> &[f64] {
        self.entries
            .get(&component_type)
            .and_then(|s| s.common_sizes.get(&field))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// 查询兜底默认值
    pub fn default_value(&self, component_type: ComponentType, field: DimensionField) -> Option<f64> {
        self.entries
            .get(&component_type)
            .and_then(|s| s.defaults.get(&field))
            .copied()
    }

    /// 值是否在合法区间内；未定义区间时视为无法判断（放行）
    pub fn is_in_range(&self, component_type: ComponentType, field: DimensionField, value: f64) -> bool {
        self.range(component_type, field)
            .map(|r| r.contains(value))
            .unwrap_or(true)
    }

    /// 值是否接近某个常用规格（±tolerance 毫米）
    pub fn near_common_size(
        &self,
        component_type: ComponentType,
        field: DimensionField,
        value: f64,
        tolerance: f64,
    ) -> bool {
        self.common_sizes(component_type, field)
            .iter()
            .any(|s| (value - s).abs() <= tolerance)
    }
}

/// 组装单类型标准数据
fn type_standard(
    ranges: &[(DimensionField, f64, f64)],
    sizes: &[(DimensionField, &[f64])],
    defaults: &[(DimensionField, f64)],
) -> TypeStandard {
    TypeStandard {
        ranges: ranges
            .iter()
            .map(|(f, min, max)| (*f, StandardRange { min: *min, max: *max }))
            .collect(),
        common_sizes: sizes.iter().map(|(f, v)| (*f, v.to_vec())).collect(),
        defaults: defaults.iter().copied().collect(),
    }
}
