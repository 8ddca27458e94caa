//! 识别结果校验模块
//!
//! 对成品构件集合执行五项独立规则检查（完整性、范围、比例、模数、体积），
//! 输出带严重程度的问题列表与汇总报告。
//!
//! 设计原则：
//! - 校验只产生数据（问题列表），不修改构件
//! - 构件按"有错误 > 仅警告 > 通过"计数，每个构件只计一次
//! - 缺标识/未知类型的构件属于调用方编程错误，在入口处拒绝

use crate::core::models::{
    Component, ComponentType, DimensionField, IssueCategory, RecognitionError, ValidationIssue,
    ValidationResult, ValidationSeverity,
};
use crate::core::standards::StandardsTable;
use chrono::Utc;

/// 结果校验器
pub struct ResultValidator {
    standards: StandardsTable,
}

impl ResultValidator {
    /// 创建校验器
    pub fn new(standards: StandardsTable) -> Self {
        Self { standards }
    }

    /// 校验构件集合，返回汇总报告
    pub fn validate(&self, components: &[Component]) -> Result<ValidationResult, RecognitionError> {
        for component in components {
            if component.id.is_empty() || component.component_type == ComponentType::Unknown {
                return Err(RecognitionError::InvalidComponent(format!(
                    "id={:?}, type={}",
                    component.id, component.component_type
                )));
            }
        }

        let mut issues = Vec::new();
        let mut passed = 0;
        let mut warnings = 0;
        let mut errors = 0;

        for component in components {
            let component_issues = self.validate_component(component);
            if component_issues.is_empty() {
                passed += 1;
            } else if component_issues
                .iter()
                .any(|i| i.severity == ValidationSeverity::Error)
            {
                errors += 1;
            } else {
                warnings += 1;
            }
            issues.extend(component_issues);
        }

        Ok(ValidationResult {
            total: components.len(),
            passed,
            warnings,
            errors,
            issues,
            generated_at: Utc::now(),
        })
    }

    /// 单个构件的全部检查（供置信度评分复用）
    pub fn validate_component(&self, component: &Component) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        self.check_completeness(component, &mut issues);
        self.check_ranges(component, &mut issues);
        self.check_ratios(component, &mut issues);
        self.check_modulus(component, &mut issues);
        self.check_volume(component, &mut issues);
        issues
    }

    /// 检查一：完整性
    fn check_completeness(&self, component: &Component, issues: &mut Vec<ValidationIssue>) {
        if component.dimensions.is_empty() {
            issues.push(issue(
                component,
                ValidationSeverity::Error,
                IssueCategory::Completeness,
                "没有提取到任何尺寸".to_string(),
                "核对原始标注或手工录入尺寸".to_string(),
            ));
            return;
        }

        let missing = component.dimensions.missing_fields(component.component_type);
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(|f| f.to_string()).collect();
            issues.push(issue(
                component,
                ValidationSeverity::Warning,
                IssueCategory::Completeness,
                format!("缺少必要尺寸: {}", names.join("、")),
                "确认图纸中是否有对应标注，或采用标准默认值".to_string(),
            ));
        }
    }

    /// 检查二：合法范围（超出2倍以上升级为错误）
    fn check_ranges(&self, component: &Component, issues: &mut Vec<ValidationIssue>) {
        for field in self.checked_fields(component) {
            let Some(value) = component.dimensions.get(field) else {
                continue;
            };
            let Some(range) = self.standards.range(component.component_type, field) else {
                continue;
            };
            if range.contains(value) {
                continue;
            }

            let severity = if range.severely_out(value) {
                ValidationSeverity::Error
            } else {
                ValidationSeverity::Warning
            };
            issues.push(issue(
                component,
                severity,
                IssueCategory::Range,
                format!(
                    "{}={}mm 超出{}的常规范围 [{}, {}]",
                    field, value, component.component_type, range.min, range.max
                ),
                "核对数值单位是否错位（米/毫米）".to_string(),
            ));
        }
    }

    /// 检查三：类型专属的比例合理性
    fn check_ratios(&self, component: &Component, issues: &mut Vec<ValidationIssue>) {
        let dims = &component.dimensions;

        match component.component_type {
            ComponentType::Beam => {
                if dims.diameter.is_none() {
                    if let (Some(w), Some(h)) = (dims.width, dims.height) {
                        let ratio = w / h;
                        if !(0.3..=1.0).contains(&ratio) {
                            issues.push(issue(
                                component,
                                ValidationSeverity::Warning,
                                IssueCategory::Ratio,
                                format!("梁宽高比 {:.2} 超出常规范围 [0.3, 1.0]", ratio),
                                "确认宽高是否写反".to_string(),
                            ));
                        }
                    }
                }
            }
            ComponentType::Column => {
                if dims.diameter.is_none() {
                    if let (Some(w), Some(h)) = (dims.width, dims.height) {
                        let ratio = w.max(h) / w.min(h).max(1.0);
                        if ratio > 3.0 {
                            issues.push(issue(
                                component,
                                ValidationSeverity::Warning,
                                IssueCategory::Ratio,
                                format!("柱截面长短边比 {:.2} 过大，疑似墙被误判为柱", ratio),
                                "确认构件类型是否应为墙".to_string(),
                            ));
                        }
                    }
                }
            }
            ComponentType::Slab => {
                if let (Some(l), Some(h)) = (dims.length, dims.height) {
                    let ratio = l / h.max(1.0);
                    if !(20.0..=50.0).contains(&ratio) {
                        issues.push(issue(
                            component,
                            ValidationSeverity::Warning,
                            IssueCategory::Ratio,
                            format!("板跨厚比 {:.1} 超出常规范围 [20, 50]", ratio),
                            "核对板厚与跨度".to_string(),
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    /// 检查四：模数合理性（常用规格±20mm 或 50mm建筑模数容差内）
    fn check_modulus(&self, component: &Component, issues: &mut Vec<ValidationIssue>) {
        for field in self.checked_fields(component) {
            let Some(value) = component.dimensions.get(field) else {
                continue;
            };

            let near_common =
                self.standards
                    .near_common_size(component.component_type, field, value, 20.0);
            let remainder = value.rem_euclid(50.0);
            let near_modulus = remainder <= 10.0 || remainder >= 40.0;

            if !near_common && !near_modulus {
                issues.push(issue(
                    component,
                    ValidationSeverity::Warning,
                    IssueCategory::Modulus,
                    format!("{}={}mm 不符合常用规格，也不在50mm建筑模数容差内", field, value),
                    "确认是否为非标构件或标注笔误".to_string(),
                ));
            }
        }
    }

    /// 检查五：体积合理性
    fn check_volume(&self, component: &Component, issues: &mut Vec<ValidationIssue>) {
        if !component.component_type.is_volumetric() {
            return;
        }

        let volume = component.dimensions.volume_mm3();
        if volume == 0.0 {
            issues.push(issue(
                component,
                ValidationSeverity::Error,
                IssueCategory::Volume,
                "计算体积为零".to_string(),
                "补全缺失尺寸后重新校验".to_string(),
            ));
        } else if volume > 1.0e12 {
            // 1000立方米，超出即大概率单位错误
            issues.push(issue(
                component,
                ValidationSeverity::Warning,
                IssueCategory::Volume,
                format!("计算体积 {:.1} 立方米，超过1000立方米", volume / 1.0e9),
                "核对尺寸单位是否错位".to_string(),
            ));
        }
    }

    /// 参与范围/模数检查的字段：圆截面只查直径与长度，宽高是直径的镜像
    fn checked_fields(&self, component: &Component) -> Vec<DimensionField> {
        use DimensionField::*;
        if component.dimensions.diameter.is_some() {
            vec![Diameter, Length]
        } else {
            vec![Width, Height, Length]
        }
    }
}

/// 组装单条问题记录
fn issue(
    component: &Component,
    severity: ValidationSeverity,
    category: IssueCategory,
    message: String,
    suggestion: String,
) -> ValidationIssue {
    ValidationIssue {
        severity,
        component_id: component.id.clone(),
        component_type: component.component_type,
        category,
        message,
        suggestion,
    }
}
