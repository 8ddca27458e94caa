//! 建筑图纸标注识别与工程量构件提取核心
//!
//! 输入是带坐标的自由文本标注（如 "KL1 300×600"、"φ500"、"剪力墙 200厚"），
//! 输出是尺寸完整、带置信度、经过规则校验的结构化构件记录。
//!
//! 核心设计原则：
//! - 解析宁可降级也不报错，问题以数据（校验问题/置信度记录）形式返回
//! - 词典与标准表在构造时注入，没有进程级可变状态
//! - 外部模型是可选协作者，缺席不是错误
//! - 同一文档两次识别必须得到相同结果

pub mod core;

pub use crate::core::classifier::{
    parse_candidates_json, ComponentClassifier, ExternalCandidate, ExternalModelHook,
    MockModelHook,
};
pub use crate::core::extractor::DimensionExtractor;
pub use crate::core::models::{
    Annotation, Component, ComponentMeta, ComponentType, ConfidenceRecord, ConfidenceWeights,
    DimensionField, DimensionSet, DrawingDocument, IssueCategory, Polyline, Position,
    RecognitionConfig, RecognitionError, RecognitionOutcome, RecognitionStrategy,
    ValidationIssue, ValidationResult, ValidationSeverity,
};
pub use crate::core::pipeline::RecognitionPipeline;
pub use crate::core::standards::{StandardRange, StandardsTable, TypeStandard};
pub use crate::core::supplement::DimensionSupplementer;
pub use crate::core::units::UnitNormalizer;
pub use crate::core::validator::ResultValidator;
