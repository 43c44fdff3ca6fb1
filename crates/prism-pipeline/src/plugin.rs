use std::sync::Arc;

use prism_core::{CoreError, Element};

use crate::{ConversionExecutor, Phase};

/// 转换插件：在某个阶段为元素追加切面与子元素。
///
/// # 契约说明（What）
/// - `phase()` 与 `priority()` 决定执行位置：阶段按管线顺序，同阶段内优先级高者先执行，再按注册顺序；
/// - `follows()` 声明逻辑上必须先于本插件执行的插件名，注册表封存时校验；
/// - `is_active()` 是激活谓词（如“检测到 JSON 内容类型”），返回 `false` 时本次跳过；
/// - `consume()` 可追加切面、创建子元素、通过 `executor.convert` 递归处理子元素，
///   或调用等待原语读取其他消息；除非显式等待，不得假设其他消息已完成解析。
///
/// # 风险提示（Trade-offs）
/// - 同阶段的插件可能对已追加的切面作出反应，因此实现应对部分重叠的切面保持幂等；
/// - 返回错误或 panic 都只会被记录并跳过该插件，不会中断其余插件。
pub trait ConversionPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn phase(&self) -> Phase;

    fn priority(&self) -> i32 {
        0
    }

    fn follows(&self) -> &[&'static str] {
        &[]
    }

    fn is_active(&self, _element: &Element) -> bool {
        true
    }

    fn consume(&self, element: &Arc<Element>, executor: &ConversionExecutor) -> Result<(), CoreError>;
}
