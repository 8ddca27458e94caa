//! 核心数据模型定义
//!
//! 所有尺寸一律使用毫米（mm）作为统一量纲，体积/面积换算由下游负责。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 识别核心的类型化错误
///
/// 仅两类情况作为显式错误暴露给调用方，其余一律降级为数据
/// （ValidationIssue / ConfidenceRecord），保证单条标注失败不会中断整体处理。
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    /// 置信度阈值必须在 0~1 之间
    #[error("置信度阈值超出范围 [0,1]: {0}")]
    InvalidThreshold(f32),
    /// 进入校验器的构件缺少有效标识（空ID或未知类型）
    #[error("构件缺少有效标识: {0}")]
    InvalidComponent(String),
}

/// 图纸平面坐标（2D为主，Z可选）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Position {
    /// 创建2D坐标
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    /// 图纸平面内的欧氏距离（忽略Z）
    pub fn distance_2d(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// 文字标注 - 识别输入的最小单元
///
/// 由上游（CAD解析等）提供，核心只读不改。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    /// 标注唯一标识
    pub id: String,
    /// 原始标注文本
    pub text: String,
    /// 标注插入点坐标
    pub position: Position,
}

impl Annotation {
    /// 创建新标注
    pub fn new(id: impl Into<String>, text: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            position: Position::new(x, y),
        }
    }
}

/// 多段线几何（用于几何识别策略）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Polyline {
    /// 顶点序列
    pub points: Vec<Position>,
    /// 是否闭合
    pub closed: bool,
}

/// 图纸文档抽象
///
/// 上游负责从图纸文件中提取标注与几何，核心只消费此结构。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrawingDocument {
    /// 有序标注列表
    pub annotations: Vec<Annotation>,
    /// 可选的多段线几何
    #[serde(default)]
    pub polylines: Vec<Polyline>,
}

/// 尺寸字段枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DimensionField {
    /// 宽（墙/板场景下即厚度）
    Width,
    /// 高
    Height,
    /// 长
    Length,
    /// 直径
    Diameter,
}

impl std::fmt::Display for DimensionField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DimensionField::Width => write!(f, "宽度"),
            DimensionField::Height => write!(f, "高度"),
            DimensionField::Length => write!(f, "长度"),
            DimensionField::Diameter => write!(f, "直径"),
        }
    }
}

/// 稀疏尺寸集合（统一毫米）
///
/// 不变量：diameter 存在时 width == height == diameter（直径标注隐含圆形截面）。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DimensionSet {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub length: Option<f64>,
    pub diameter: Option<f64>,
}

impl DimensionSet {
    /// 空集合
    pub fn empty() -> Self {
        Self::default()
    }

    /// 是否没有任何字段
    pub fn is_empty(&self) -> bool {
        self.width.is_none()
            && self.height.is_none()
            && self.length.is_none()
            && self.diameter.is_none()
    }

    /// 已填充字段数
    pub fn filled_count(&self) -> usize {
        [self.width, self.height, self.length, self.diameter]
            .iter()
            .filter(|v| v.is_some())
            .count()
    }

    /// 读取指定字段
    pub fn get(&self, field: DimensionField) -> Option<f64> {
        match field {
            DimensionField::Width => self.width,
            DimensionField::Height => self.height,
            DimensionField::Length => self.length,
            DimensionField::Diameter => self.diameter,
        }
    }

    /// 写入指定字段（直径写入会同步宽高）
    pub fn set(&mut self, field: DimensionField, value: f64) {
        match field {
            DimensionField::Width => self.width = Some(value),
            DimensionField::Height => self.height = Some(value),
            DimensionField::Length => self.length = Some(value),
            DimensionField::Diameter => self.set_diameter(value),
        }
    }

    /// 写入直径并维持 width == height == diameter
    pub fn set_diameter(&mut self, value: f64) {
        self.diameter = Some(value);
        self.width = Some(value);
        self.height = Some(value);
    }

    /// 只填补缺失字段，不覆盖已有值（优先级合并的基本操作）
    ///
    /// 直径字段只在宽/高/直径全部缺失时整体填入，避免破坏圆截面不变量。
    pub fn merge_missing(&mut self, other: &DimensionSet) {
        if self.width.is_none() && self.height.is_none() && self.diameter.is_none() {
            if let Some(d) = other.diameter {
                self.set_diameter(d);
            }
        }
        if self.width.is_none() {
            self.width = other.width;
        }
        if self.height.is_none() {
            self.height = other.height;
        }
        if self.length.is_none() {
            self.length = other.length;
        }
    }

    /// 对于指定构件类型，尺寸是否已经完整
    pub fn is_complete_for(&self, component_type: ComponentType) -> bool {
        match component_type {
            ComponentType::Door | ComponentType::Window => {
                self.width.is_some() && self.height.is_some()
            }
            ComponentType::Unknown => false,
            _ => {
                let round = self.diameter.is_some() && self.length.is_some();
                let boxed =
                    self.width.is_some() && self.height.is_some() && self.length.is_some();
                round || boxed
            }
        }
    }

    /// 对于指定构件类型，仍缺失的必要字段
    pub fn missing_fields(&self, component_type: ComponentType) -> Vec<DimensionField> {
        // 圆截面构件用直径+长度即可，不再要求宽高
        if component_type.is_volumetric() && self.diameter.is_some() {
            return if self.length.is_none() {
                vec![DimensionField::Length]
            } else {
                Vec::new()
            };
        }

        component_type
            .required_fields()
            .iter()
            .copied()
            .filter(|f| self.get(*f).is_none())
            .collect()
    }

    /// 体积（立方毫米），圆截面按 π/4·d²·L 计算
    ///
    /// 缺失字段按0参与计算，调用方据此判断"零体积"异常。
    pub fn volume_mm3(&self) -> f64 {
        if let (Some(d), Some(l)) = (self.diameter, self.length) {
            return std::f64::consts::FRAC_PI_4 * d * d * l;
        }
        self.width.unwrap_or(0.0) * self.height.unwrap_or(0.0) * self.length.unwrap_or(0.0)
    }

    /// 平面面积（平方毫米）
    pub fn area_mm2(&self) -> f64 {
        self.width.unwrap_or(0.0) * self.length.unwrap_or(0.0)
    }
}

/// 构件类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ComponentType {
    /// 梁
    Beam,
    /// 柱
    Column,
    /// 墙
    Wall,
    /// 板
    Slab,
    /// 门
    Door,
    /// 窗
    Window,
    /// 楼梯
    Stair,
    /// 未识别
    #[default]
    Unknown,
}

impl ComponentType {
    /// 稳定的类型标签（用于ID哈希与去重键）
    pub fn tag(&self) -> &'static str {
        match self {
            ComponentType::Beam => "beam",
            ComponentType::Column => "column",
            ComponentType::Wall => "wall",
            ComponentType::Slab => "slab",
            ComponentType::Door => "door",
            ComponentType::Window => "window",
            ComponentType::Stair => "stair",
            ComponentType::Unknown => "unknown",
        }
    }

    /// 该类型必要的尺寸字段
    pub fn required_fields(&self) -> &'static [DimensionField] {
        use DimensionField::*;
        match self {
            ComponentType::Door | ComponentType::Window => &[Width, Height],
            ComponentType::Unknown => &[],
            _ => &[Width, Height, Length],
        }
    }

    /// 是否为体积构件（参与零体积/超大体积校验）
    pub fn is_volumetric(&self) -> bool {
        matches!(
            self,
            ComponentType::Beam
                | ComponentType::Column
                | ComponentType::Wall
                | ComponentType::Slab
                | ComponentType::Stair
        )
    }

    /// 从外部模型返回的类型名解析（中英文均可）
    pub fn from_label(label: &str) -> ComponentType {
        let l = label.trim().to_lowercase();
        match l.as_str() {
            "梁" | "beam" => ComponentType::Beam,
            "柱" | "column" => ComponentType::Column,
            "墙" | "剪力墙" | "wall" => ComponentType::Wall,
            "板" | "楼板" | "slab" => ComponentType::Slab,
            "门" | "door" => ComponentType::Door,
            "窗" | "window" => ComponentType::Window,
            "楼梯" | "stair" | "stairs" => ComponentType::Stair,
            _ => ComponentType::Unknown,
        }
    }
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentType::Beam => write!(f, "梁"),
            ComponentType::Column => write!(f, "柱"),
            ComponentType::Wall => write!(f, "墙"),
            ComponentType::Slab => write!(f, "板"),
            ComponentType::Door => write!(f, "门"),
            ComponentType::Window => write!(f, "窗"),
            ComponentType::Stair => write!(f, "楼梯"),
            ComponentType::Unknown => write!(f, "未知"),
        }
    }
}

/// 识别策略来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecognitionStrategy {
    /// 关键词/词典匹配
    Keyword,
    /// 构件编号正则
    CodePattern,
    /// 闭合多段线几何
    Geometry,
    /// 外部模型
    ExternalModel,
}

impl std::fmt::Display for RecognitionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecognitionStrategy::Keyword => write!(f, "关键词"),
            RecognitionStrategy::CodePattern => write!(f, "编号"),
            RecognitionStrategy::Geometry => write!(f, "几何"),
            RecognitionStrategy::ExternalModel => write!(f, "外部模型"),
        }
    }
}

/// 构件附加元数据
///
/// 封闭结构，替代开放式属性袋：只记录识别来源与管线处理标记。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentMeta {
    /// 产生该构件的策略
    pub strategy: RecognitionStrategy,
    /// 尺寸经过单位错位纠正
    pub corrected: bool,
    /// 缺失尺寸由同类构件上下文补全
    pub inferred_from_context: bool,
}

impl ComponentMeta {
    /// 按策略创建初始元数据
    pub fn from_strategy(strategy: RecognitionStrategy) -> Self {
        Self {
            strategy,
            corrected: false,
            inferred_from_context: false,
        }
    }
}

/// 构件 - 结构化的建筑元素记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    /// 稳定唯一标识（基于类型+名称+来源标注的hash）
    pub id: String,
    /// 构件类型
    pub component_type: ComponentType,
    /// 显示名称（一般为构件编号，如 KL1）
    pub name: String,
    /// 来源标注ID列表
    pub source_annotation_ids: Vec<String>,
    /// 尺寸集合（毫米）
    pub dimensions: DimensionSet,
    /// 材质标记（如 C30、混凝土）
    pub material: Option<String>,
    /// 数量系数
    pub quantity: f64,
    /// 附加元数据
    pub meta: ComponentMeta,
}

impl Component {
    /// 创建新构件
    pub fn new(
        component_type: ComponentType,
        name: String,
        source_annotation_id: Option<String>,
        strategy: RecognitionStrategy,
    ) -> Self {
        use sha2::{Digest, Sha256};

        // 生成稳定ID，保证同一输入多次识别得到相同结果
        let mut hasher = Sha256::new();
        hasher.update(component_type.tag().as_bytes());
        hasher.update(b":");
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(source_annotation_id.as_deref().unwrap_or("").as_bytes());
        let id = hex::encode(&hasher.finalize()[..16]);

        Self {
            id,
            component_type,
            name,
            source_annotation_ids: source_annotation_id.into_iter().collect(),
            dimensions: DimensionSet::empty(),
            material: None,
            quantity: 1.0,
            meta: ComponentMeta::from_strategy(strategy),
        }
    }
}

/// 置信度评估记录
///
/// 与管线终态的每个存活构件一一对应。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceRecord {
    /// 对应构件ID
    pub component_id: String,
    /// 构件类型
    pub component_type: ComponentType,
    /// 置信度 (0.0 - 1.0)
    pub score: f32,
    /// 扣分理由（有序）
    pub reasons: Vec<String>,
    /// 是否达到阈值
    pub passed: bool,
    /// 改进建议
    pub suggestions: Vec<String>,
}

/// 校验严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationSeverity {
    /// 通过
    Pass,
    /// 警告
    Warning,
    /// 错误
    Error,
}

impl std::fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationSeverity::Pass => write!(f, "通过"),
            ValidationSeverity::Warning => write!(f, "警告"),
            ValidationSeverity::Error => write!(f, "错误"),
        }
    }
}

/// 校验问题类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueCategory {
    /// 完整性
    Completeness,
    /// 合法范围
    Range,
    /// 比例合理性
    Ratio,
    /// 模数合理性
    Modulus,
    /// 体积/面积合理性
    Volume,
}

impl std::fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueCategory::Completeness => write!(f, "完整性"),
            IssueCategory::Range => write!(f, "范围"),
            IssueCategory::Ratio => write!(f, "比例"),
            IssueCategory::Modulus => write!(f, "模数"),
            IssueCategory::Volume => write!(f, "体积"),
        }
    }
}

/// 单条校验问题（只产生不修改）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// 严重程度
    pub severity: ValidationSeverity,
    /// 问题构件ID
    pub component_id: String,
    /// 问题构件类型
    pub component_type: ComponentType,
    /// 问题类别
    pub category: IssueCategory,
    /// 问题描述
    pub message: String,
    /// 修正建议
    pub suggestion: String,
}

/// 校验结果汇总报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// 构件总数
    pub total: usize,
    /// 完全通过的构件数
    pub passed: usize,
    /// 仅有警告的构件数
    pub warnings: usize,
    /// 存在错误的构件数
    pub errors: usize,
    /// 全部问题（有序）
    pub issues: Vec<ValidationIssue>,
    /// 报告生成时间
    pub generated_at: DateTime<Utc>,
}

impl ValidationResult {
    /// 是否所有构件均无问题
    pub fn is_all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// 识别管线终态输出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionOutcome {
    /// 本次识别批次ID
    pub batch_id: String,
    /// 通过阈值的构件列表
    pub components: Vec<Component>,
    /// 与构件一一对应的置信度记录
    pub confidence: Vec<ConfidenceRecord>,
    /// 对存活构件的最终校验报告
    pub validation: ValidationResult,
}

/// 置信度扣分权重
///
/// 只有相对大小是硬性约定（缺失越多分越低），绝对数值可按工程经验调整。
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    /// 名称为空的扣分
    pub missing_name: f32,
    /// 必要尺寸缺失的最大扣分（按缺失比例折算）
    pub missing_dims: f32,
    /// 校验问题的最大扣分
    pub issue_cap: f32,
    /// 每个错误级问题的扣分
    pub issue_error: f32,
    /// 每个警告级问题的扣分
    pub issue_warning: f32,
    /// 名称未命中专业词典的扣分
    pub unknown_term: f32,
    /// 经过单位纠正的扣分
    pub corrected: f32,
    /// 经过上下文推断的扣分
    pub inferred: f32,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            missing_name: 0.1,
            missing_dims: 0.3,
            issue_cap: 0.3,
            issue_error: 0.15,
            issue_warning: 0.05,
            unknown_term: 0.2,
            corrected: 0.05,
            inferred: 0.05,
        }
    }
}

/// 识别配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// 置信度阈值（低于此值的构件被丢弃）
    pub confidence_threshold: f32,
    /// 邻近标注搜索半径（毫米）
    pub neighbor_radius_mm: f64,
    /// 送入外部模型的样本上限
    pub external_sample_limit: usize,
    /// 置信度扣分权重
    pub weights: ConfidenceWeights,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.95,
            neighbor_radius_mm: 500.0,
            external_sample_limit: 50,
            weights: ConfidenceWeights::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diameter_implies_square_section() {
        let mut dims = DimensionSet::empty();
        dims.set_diameter(500.0);
        assert_eq!(dims.width, Some(500.0));
        assert_eq!(dims.height, Some(500.0));
        assert_eq!(dims.diameter, Some(500.0));
    }

    #[test]
    fn test_merge_missing_keeps_existing() {
        let mut a = DimensionSet {
            width: Some(250.0),
            ..Default::default()
        };
        let b = DimensionSet {
            width: Some(300.0),
            height: Some(600.0),
            ..Default::default()
        };
        a.merge_missing(&b);
        assert_eq!(a.width, Some(250.0));
        assert_eq!(a.height, Some(600.0));
    }

    #[test]
    fn test_merge_missing_diameter_requires_clean_section() {
        // 已有宽度时不引入直径，避免打破圆截面不变量
        let mut a = DimensionSet {
            width: Some(250.0),
            ..Default::default()
        };
        let b = {
            let mut d = DimensionSet::empty();
            d.set_diameter(500.0);
            d
        };
        a.merge_missing(&b);
        assert_eq!(a.width, Some(250.0));
        assert_eq!(a.diameter, None);
        // 宽高来自直径集合的字段值仍可填补
        assert_eq!(a.height, Some(500.0));
    }

    #[test]
    fn test_completeness_round_member() {
        let mut dims = DimensionSet::empty();
        dims.set_diameter(500.0);
        assert!(!dims.is_complete_for(ComponentType::Column));
        dims.length = Some(3000.0);
        assert!(dims.is_complete_for(ComponentType::Column));
        assert!(dims.missing_fields(ComponentType::Column).is_empty());
    }

    #[test]
    fn test_volume_round_vs_boxed() {
        let mut round = DimensionSet::empty();
        round.set_diameter(500.0);
        round.length = Some(3000.0);
        let expected = std::f64::consts::FRAC_PI_4 * 500.0 * 500.0 * 3000.0;
        assert!((round.volume_mm3() - expected).abs() < 1e-6);

        let boxed = DimensionSet {
            width: Some(300.0),
            height: Some(600.0),
            length: Some(6000.0),
            diameter: None,
        };
        assert!((boxed.volume_mm3() - 300.0 * 600.0 * 6000.0).abs() < 1e-6);
    }

    #[test]
    fn test_component_id_is_stable() {
        let a = Component::new(
            ComponentType::Beam,
            "KL1".to_string(),
            Some("a1".to_string()),
            RecognitionStrategy::Keyword,
        );
        let b = Component::new(
            ComponentType::Beam,
            "KL1".to_string(),
            Some("a1".to_string()),
            RecognitionStrategy::Keyword,
        );
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_type_label_parsing() {
        assert_eq!(ComponentType::from_label("剪力墙"), ComponentType::Wall);
        assert_eq!(ComponentType::from_label("Beam"), ComponentType::Beam);
        assert_eq!(ComponentType::from_label("飘窗台"), ComponentType::Unknown);
    }
}
