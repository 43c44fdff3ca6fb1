//! 全局日志订阅器只能安装一次；独立测试二进制保证没有其他订阅器抢先安装。

use prism_capture::{CaptureError, observability};

#[test]
fn second_install_is_rejected_without_panicking() {
    assert_eq!(observability::installed_filter(), None);
    observability::install("prism_capture=debug,info").expect("首次安装成功");
    assert_eq!(observability::installed_filter(), Some("prism_capture=debug,info"));

    let again = observability::install("warn").expect_err("重复安装被拒绝");
    assert!(matches!(again, CaptureError::LoggingInstalled(_)));
    assert_eq!(again.code(), "logging.install");
    assert_eq!(observability::installed_filter(), Some("prism_capture=debug,info"));
}
