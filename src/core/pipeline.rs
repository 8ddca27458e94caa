//! 置信度识别管线
//!
//! 五个有序且不可跳过的阶段：多策略识别 → 标准纠正 → 上下文推断 →
//! 外部模型校验（可缺省）→ 多轮置信度评分。
//!
//! 设计原则：
//! - 每个阶段接收上一阶段的完整构件列表
//! - 低置信度构件直接丢弃，不再继续加工
//! - 存活构件与置信度记录一一对应

use crate::core::classifier::{ComponentClassifier, ExternalModelHook};
use crate::core::models::{
    Component, ComponentType, ConfidenceRecord, DimensionField, DimensionSet, DrawingDocument,
    RecognitionConfig, RecognitionError, RecognitionOutcome, RecognitionStrategy,
    ValidationIssue, ValidationSeverity,
};
use crate::core::standards::StandardsTable;
use crate::core::supplement::DimensionSupplementer;
use crate::core::validator::ResultValidator;
use std::collections::HashMap;

/// 识别管线
pub struct RecognitionPipeline {
    classifier: ComponentClassifier,
    supplementer: DimensionSupplementer,
    standards: StandardsTable,
    validator: ResultValidator,
    config: RecognitionConfig,
}

impl RecognitionPipeline {
    /// 用内置标准表创建管线；阈值不在 [0,1] 内直接拒绝
    pub fn new(config: RecognitionConfig) -> Result<Self, RecognitionError> {
        Self::with_standards(config, StandardsTable::builtin())
    }

    /// 用自定义标准表创建管线（测试替换用）
    pub fn with_standards(
        config: RecognitionConfig,
        standards: StandardsTable,
    ) -> Result<Self, RecognitionError> {
        if !(0.0..=1.0).contains(&config.confidence_threshold) {
            return Err(RecognitionError::InvalidThreshold(config.confidence_threshold));
        }

        Ok(Self {
            classifier: ComponentClassifier::new(standards.clone(), config.neighbor_radius_mm),
            supplementer: DimensionSupplementer::new(standards.clone(), config.neighbor_radius_mm),
            validator: ResultValidator::new(standards.clone()),
            standards,
            config,
        })
    }

    /// 执行一次完整识别
    pub fn run(
        &self,
        document: &DrawingDocument,
        hook: Option<&dyn ExternalModelHook>,
    ) -> Result<RecognitionOutcome, RecognitionError> {
        // 阶段一：多策略识别 + 去重
        let mut components =
            self.classifier
                .recognize(document, hook, self.config.external_sample_limit);
        tracing::info!(stage = 1, count = components.len(), "多策略识别");

        // 阶段二：标准纠正
        self.correct_against_standards(&mut components);
        tracing::info!(stage = 2, count = components.len(), "标准纠正");

        // 阶段三：上下文推断
        self.infer_from_context(&mut components);
        tracing::info!(stage = 3, count = components.len(), "上下文推断");

        // 阶段四：外部模型校验（未配置时原样通过）
        self.external_validation(&mut components, hook);
        tracing::info!(stage = 4, count = components.len(), "外部模型校验");

        // 阶段五：多轮置信度评分与阈值过滤
        let (components, confidence) = self.score_components(components);
        tracing::info!(stage = 5, count = components.len(), "置信度过滤");

        let validation = self.validator.validate(&components)?;

        Ok(RecognitionOutcome {
            batch_id: uuid::Uuid::new_v4().to_string(),
            components,
            confidence,
            validation,
        })
    }

    /// 阶段二：越界尺寸按单位错位启发式纠正
    ///
    /// 小于10的值按误录的米处理（×1000），大于100000的值按反向错位处理（÷1000）。
    fn correct_against_standards(&self, components: &mut [Component]) {
        use DimensionField::*;

        for component in components.iter_mut() {
            // 直径放最后，写入时会同步宽高
            for field in [Width, Height, Length, Diameter] {
                let Some(value) = component.dimensions.get(field) else {
                    continue;
                };
                if self
                    .standards
                    .is_in_range(component.component_type, field, value)
                {
                    continue;
                }

                let corrected = if value < 10.0 {
                    Some(value * 1000.0)
                } else if value > 100_000.0 {
                    Some(value / 1000.0)
                } else {
                    None
                };

                if let Some(new_value) = corrected {
                    tracing::warn!(
                        component = %component.name,
                        field = %field,
                        from = value,
                        to = new_value,
                        "尺寸单位错位纠正"
                    );
                    component.dimensions.set(field, new_value);
                    component.meta.corrected = true;
                }
            }
        }
    }

    /// 阶段三：用同类构件中最常见的完整尺寸补全仍缺失的构件
    fn infer_from_context(&self, components: &mut [Component]) {
        // 统计每个类型下完整尺寸集合的出现频次
        let mut frequency: HashMap<ComponentType, HashMap<String, (usize, DimensionSet)>> =
            HashMap::new();
        for component in components.iter() {
            if component
                .dimensions
                .is_complete_for(component.component_type)
            {
                let entry = frequency
                    .entry(component.component_type)
                    .or_default()
                    .entry(dims_key(&component.dimensions))
                    .or_insert((0, component.dimensions.clone()));
                entry.0 += 1;
            }
        }

        // 每类取众数；频次相同时按键排序保证确定性
        let modal: HashMap<ComponentType, DimensionSet> = frequency
            .into_iter()
            .map(|(t, counts)| {
                let mut entries: Vec<(String, (usize, DimensionSet))> = counts.into_iter().collect();
                entries.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.0.cmp(&b.0)));
                (t, entries.remove(0).1 .1)
            })
            .collect();

        for component in components.iter_mut() {
            if component
                .dimensions
                .is_complete_for(component.component_type)
            {
                continue;
            }
            let Some(reference) = modal.get(&component.component_type) else {
                continue;
            };

            let before = component.dimensions.filled_count();
            component.dimensions.merge_missing(reference);
            if component.dimensions.filled_count() > before {
                component.meta.inferred_from_context = true;
                tracing::debug!(component = %component.name, "从同类构件上下文补全尺寸");
            }
        }
    }

    /// 阶段四：外部模型候选按（类型，名称）并入构件列表
    fn external_validation(
        &self,
        components: &mut Vec<Component>,
        hook: Option<&dyn ExternalModelHook>,
    ) {
        let Some(hook) = hook else {
            return;
        };

        let samples: Vec<String> = components
            .iter()
            .take(self.config.external_sample_limit)
            .map(|c| c.name.clone())
            .collect();

        let candidates = match hook.classify_batch(&samples) {
            Ok(c) => c,
            Err(e) => {
                // 外部校验失败只降级为跳过
                tracing::warn!("外部模型校验失败: {}", e);
                return;
            }
        };

        for candidate in candidates {
            let component_type = ComponentType::from_label(&candidate.type_name);
            if component_type == ComponentType::Unknown {
                continue;
            }

            if let Some(existing) = components
                .iter_mut()
                .find(|c| c.component_type == component_type && c.name == candidate.name)
            {
                existing.dimensions.merge_missing(&candidate.dimensions);
            } else {
                let mut component = Component::new(
                    component_type,
                    candidate.name,
                    None,
                    RecognitionStrategy::ExternalModel,
                );
                component.dimensions =
                    self.supplementer
                        .supplement(&candidate.dimensions, component_type, None, &[]);
                components.push(component);
            }
        }
    }

    /// 阶段五：逐构件评分，按阈值与校验结果过滤
    fn score_components(
        &self,
        components: Vec<Component>,
    ) -> (Vec<Component>, Vec<ConfidenceRecord>) {
        let mut survivors = Vec::new();
        let mut records = Vec::new();

        for component in components {
            let issues = self.validator.validate_component(&component);
            let (score, reasons, suggestions) = self.score_one(&component, &issues);

            // 达标要求：置信度不低于阈值，且校验零问题
            let passed = score >= self.config.confidence_threshold && issues.is_empty();
            if !passed {
                tracing::warn!(
                    component = %component.name,
                    score,
                    issues = issues.len(),
                    "构件未达置信度要求，丢弃"
                );
                continue;
            }

            records.push(ConfidenceRecord {
                component_id: component.id.clone(),
                component_type: component.component_type,
                score,
                reasons,
                passed,
                suggestions,
            });
            survivors.push(component);
        }

        (survivors, records)
    }

    /// 单构件置信度：从1.0开始按权重逐项扣分，最终截断到 [0,1]
    fn score_one(
        &self,
        component: &Component,
        issues: &[ValidationIssue],
    ) -> (f32, Vec<String>, Vec<String>) {
        let weights = &self.config.weights;
        let mut score: f32 = 1.0;
        let mut reasons = Vec::new();
        let mut suggestions = Vec::new();

        if component.name.trim().is_empty() {
            score -= weights.missing_name;
            reasons.push("构件名称为空".to_string());
            suggestions.push("从图纸标注中补充构件编号".to_string());
        }

        let required = component.component_type.required_fields().len();
        let missing = component
            .dimensions
            .missing_fields(component.component_type)
            .len();
        if required > 0 && missing > 0 {
            score -= weights.missing_dims * missing as f32 / required as f32;
            reasons.push(format!("缺少{}个必要尺寸", missing));
            suggestions.push("补全缺失尺寸或检查邻近标注".to_string());
        }

        let issue_deduction: f32 = issues
            .iter()
            .map(|i| match i.severity {
                ValidationSeverity::Error => weights.issue_error,
                ValidationSeverity::Warning => weights.issue_warning,
                ValidationSeverity::Pass => 0.0,
            })
            .sum();
        if issue_deduction > 0.0 {
            score -= issue_deduction.min(weights.issue_cap);
            reasons.push(format!("存在{}条校验问题", issues.len()));
            suggestions.push("按校验报告逐条核对".to_string());
        }

        if !self
            .classifier
            .matches_terminology(component.component_type, &component.name)
        {
            score -= weights.unknown_term;
            reasons.push("名称未命中专业词典".to_string());
            suggestions.push("确认构件类型判定是否正确".to_string());
        }

        if component.meta.corrected {
            score -= weights.corrected;
            reasons.push("尺寸经过单位错位纠正".to_string());
        }
        if component.meta.inferred_from_context {
            score -= weights.inferred;
            reasons.push("尺寸由同类构件上下文推断".to_string());
        }

        (score.clamp(0.0, 1.0), reasons, suggestions)
    }
}

/// 尺寸集合的频次统计键
fn dims_key(dims: &DimensionSet) -> String {
    format!(
        "{:?}|{:?}|{:?}|{:?}",
        dims.width, dims.height, dims.length, dims.diameter
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::{ExternalCandidate, MockModelHook};
    use crate::core::models::Annotation;

    fn pipeline() -> RecognitionPipeline {
        RecognitionPipeline::new(RecognitionConfig::default()).unwrap()
    }

    fn doc(texts: &[(&str, &str, f64, f64)]) -> DrawingDocument {
        DrawingDocument {
            annotations: texts
                .iter()
                .map(|(id, text, x, y)| Annotation::new(*id, *text, *x, *y))
                .collect(),
            polylines: Vec::new(),
        }
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let config = RecognitionConfig {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            RecognitionPipeline::new(config),
            Err(RecognitionError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_clean_beam_full_confidence() {
        let p = pipeline();
        let outcome = p
            .run(&doc(&[("a1", "KL1 300×600", 0.0, 0.0)]), None)
            .unwrap();

        assert_eq!(outcome.components.len(), 1);
        assert_eq!(outcome.confidence.len(), 1);
        let record = &outcome.confidence[0];
        assert!(record.passed);
        assert!((record.score - 1.0).abs() < 1e-6);
        assert!(outcome.validation.is_all_passed());
    }

    #[test]
    fn test_unit_correction_stage() {
        let p = pipeline();
        // 0.3×0.6 是误录成米的截面，应被纠正为 300×600
        let outcome = p
            .run(&doc(&[("a1", "L1 0.3×0.6", 0.0, 0.0)]), None)
            .unwrap();

        assert_eq!(outcome.components.len(), 1);
        let c = &outcome.components[0];
        assert!(c.meta.corrected);
        assert_eq!(c.dimensions.width, Some(300.0));
        assert_eq!(c.dimensions.height, Some(600.0));
        // 纠正过的构件要扣0.05
        assert!((outcome.confidence[0].score - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_context_inference_stage() {
        let p = pipeline();
        // M2 没有任何尺寸，应从同类门 M1 的完整尺寸推断
        let outcome = p
            .run(
                &doc(&[
                    ("a1", "M1 900×2100", 0.0, 0.0),
                    ("a2", "门M2", 10000.0, 0.0),
                ]),
                None,
            )
            .unwrap();

        let m2 = outcome
            .components
            .iter()
            .find(|c| c.name == "M2")
            .expect("M2 应当存活");
        assert!(m2.meta.inferred_from_context);
        assert_eq!(m2.dimensions.width, Some(900.0));
        assert_eq!(m2.dimensions.height, Some(2100.0));
    }

    #[test]
    fn test_confidence_monotonic_in_missing_dims() {
        let p = pipeline();

        let mut complete = Component::new(
            ComponentType::Beam,
            "KL1".to_string(),
            None,
            RecognitionStrategy::Keyword,
        );
        complete.dimensions = DimensionSet {
            width: Some(300.0),
            height: Some(600.0),
            length: Some(6000.0),
            diameter: None,
        };

        let mut incomplete = complete.clone();
        incomplete.dimensions.length = None;

        let complete_issues = p.validator.validate_component(&complete);
        let incomplete_issues = p.validator.validate_component(&incomplete);
        let (complete_score, _, _) = p.score_one(&complete, &complete_issues);
        let (incomplete_score, _, _) = p.score_one(&incomplete, &incomplete_issues);

        assert!(incomplete_score < complete_score);
    }

    #[test]
    fn test_low_confidence_dropped() {
        let p = pipeline();
        // 裸编号无尺寸且同类无上下文可借，校验必有问题，不能存活
        let outcome = p.run(&doc(&[("a1", "KL7", 0.0, 0.0)]), None).unwrap();
        assert!(outcome.components.is_empty());
        assert!(outcome.confidence.is_empty());
    }

    #[test]
    fn test_external_hook_passthrough_when_absent() {
        let p = pipeline();
        let document = doc(&[("a1", "KL1 300×600", 0.0, 0.0)]);
        let without = p.run(&document, None).unwrap();
        assert_eq!(without.components.len(), 1);
    }

    #[test]
    fn test_external_stage_adds_candidates() {
        struct FixedHook;
        impl ExternalModelHook for FixedHook {
            fn classify_batch(&self, _samples: &[String]) -> anyhow::Result<Vec<ExternalCandidate>> {
                Ok(vec![ExternalCandidate {
                    type_name: "柱".to_string(),
                    name: "KZ9".to_string(),
                    dimensions: DimensionSet {
                        width: Some(500.0),
                        height: Some(500.0),
                        ..Default::default()
                    },
                }])
            }
        }

        let p = pipeline();
        let outcome = p
            .run(&doc(&[("a1", "KL1 300×600", 0.0, 0.0)]), Some(&FixedHook))
            .unwrap();

        let kz9 = outcome
            .components
            .iter()
            .find(|c| c.name == "KZ9")
            .expect("外部候选应并入结果");
        assert_eq!(kz9.component_type, ComponentType::Column);
        assert_eq!(kz9.dimensions.length, Some(3000.0));
    }

    #[test]
    fn test_mock_hook_is_consistent_with_text_strategies() {
        let p = pipeline();
        let document = doc(&[("a1", "梁KL1 300×600", 0.0, 0.0)]);
        let hook = MockModelHook::default();
        let outcome = p.run(&document, Some(&hook)).unwrap();
        // 外部模型与文本策略识别出同一构件时必须合并而不是重复
        let beams: Vec<_> = outcome
            .components
            .iter()
            .filter(|c| c.component_type == ComponentType::Beam)
            .collect();
        assert_eq!(beams.len(), beams.iter().map(|c| &c.name).collect::<std::collections::HashSet<_>>().len());
    }
}
