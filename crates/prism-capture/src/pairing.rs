//! 请求/响应配对。
//!
//! # 设计背景（Why）
//! - 断言代码经常需要“这条响应回答的是哪条请求”；抓包只给出字节与端点，配对必须事后推断；
//! - 推断依赖早期消息的传输切面，因此配对前先等待之前到达的全部消息完成转换：
//!   正确性取决于管线完成顺序，而不是墙钟到达顺序。
//!
//! # 契约说明（What）
//! - 只处理响应形态（某个切面 `is_reply`）且尚无配对链接的顶层消息；
//! - 候选请求：更早到达、请求形态（`expects_reply`）、尚未被认领、端点对恰好反向；
//! - 认领通过并发集合原子完成，链接 [`MessagePairFacet`] 同时挂在两端且不再替换；
//! - 默认无限等待，配对结果只取决于完成顺序；配置了等待上限且超时，或管线被中断时，
//!   响应不会被配对：插件在响应上留下警告注释 [`NoteFacet`]，并把等待错误交给执行器记录。

use std::{sync::Arc, time::Duration};

use dashmap::DashSet;
use prism_core::{
    CoreError, Element, ElementId,
    facets::{MessagePairFacet, NoteFacet, NoteSeverity, TcpIpMessageFacet},
};
use prism_pipeline::{ConversionExecutor, ConversionPlugin, Phase};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub(crate) const NAME: &str = "pairing";

/// 多个未认领请求同时满足条件时的选择策略。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingStrategy {
    /// 最近到达的未认领请求。
    #[default]
    Nearest,
    /// 最早到达的未认领请求（HTTP/1.1 流水线按序应答）。
    Oldest,
}

pub struct PairingPlugin {
    strategy: PairingStrategy,
    wait_timeout: Option<Duration>,
    claimed: DashSet<ElementId>,
}

impl PairingPlugin {
    /// `wait_timeout` 为 `None` 时，等待之前的消息直到它们完成或管线被中断。
    pub fn new(strategy: PairingStrategy, wait_timeout: Option<Duration>) -> Self {
        Self {
            strategy,
            wait_timeout,
            claimed: DashSet::new(),
        }
    }

    pub fn strategy(&self) -> PairingStrategy {
        self.strategy
    }

    /// 已被认领的请求数量。
    pub fn claimed(&self) -> usize {
        self.claimed.len()
    }

    fn candidates<'a>(
        &self,
        earlier: &'a [Arc<Element>],
        response: &'a TcpIpMessageFacet,
    ) -> Box<dyn Iterator<Item = &'a Arc<Element>> + 'a> {
        let eligible = move |request: &&'a Arc<Element>| {
            request.expects_reply()
                && !request.has_facet::<MessagePairFacet>()
                && request
                    .facet::<TcpIpMessageFacet>()
                    .is_some_and(|transport| transport.is_reverse_of(response))
        };
        match self.strategy {
            PairingStrategy::Nearest => Box::new(earlier.iter().rev().filter(eligible)),
            PairingStrategy::Oldest => Box::new(earlier.iter().filter(eligible)),
        }
    }
}

impl ConversionPlugin for PairingPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn phase(&self) -> Phase {
        Phase::Correlation
    }

    fn is_active(&self, element: &Element) -> bool {
        element.parent_id().is_none()
            && element.is_reply()
            && !element.has_facet::<MessagePairFacet>()
            && element.has_facet::<TcpIpMessageFacet>()
    }

    fn consume(&self, element: &Arc<Element>, executor: &ConversionExecutor) -> Result<(), CoreError> {
        if let Err(error) = executor.wait_until_all_earlier_parsed(element, self.wait_timeout) {
            element.add_facet(NoteFacet::new(
                NoteSeverity::Warn,
                format!("response left unpaired: {error}"),
            ));
            return Err(error);
        }
        let Some(transport) = element.facet::<TcpIpMessageFacet>() else {
            return Ok(());
        };
        let earlier = executor.history().earlier_than(element);
        let claimed = self
            .candidates(&earlier, &transport)
            .find(|request| self.claimed.insert(request.id()));
        match claimed {
            Some(request) => {
                let link = MessagePairFacet::new(request.id(), element.id());
                request.add_facet(link);
                element.add_facet(link);
                debug!(
                    request = %request.id(),
                    response = %element.id(),
                    strategy = ?self.strategy,
                    "request/response paired"
                );
            }
            None => debug!(response = %element.id(), "no unclaimed request to pair with"),
        }
        Ok(())
    }
}
