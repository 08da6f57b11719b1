use quiesce_logging::{init_logging, LoggingConfig};
use quiesce_shutdown::{
    BoundedClose, Context, FaultInjecting, ResourceHandle, SimulatedSession, EARLY, RETURN_KEY,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    if let Err(e) = init_logging(&LoggingConfig::default()) {
        eprintln!("logging disabled: {}", e);
    }

    println!("=== 有界关闭示例 ===\n");

    // 1. 正常关闭，上下文带 2 秒超时
    println!("1. 生产策略，上下文超时 2 秒");
    let closer = BoundedClose::new();
    let session = ResourceHandle::new(Arc::new(
        SimulatedSession::new("orders-db").with_close_latency(Duration::from_millis(300)),
    ));
    let (ctx, _cancel) = Context::with_timeout(&Context::background(), Duration::from_secs(2));
    let attempt = closer.attempt(&ctx, &session).await;
    println!("结果: {:?}", attempt.result);
    print_report(&attempt.report);

    // 2. 上下文截止时间短于关闭耗时
    println!("\n2. 故障注入策略，上下文超时 200 毫秒");
    let slow = BoundedClose::builder()
        .with_strategy(FaultInjecting::new(Duration::from_millis(1100)))
        .build();
    let session = ResourceHandle::new(Arc::new(SimulatedSession::new("metrics-db")));
    let (ctx, _cancel) = Context::with_timeout(&Context::background(), Duration::from_millis(200));
    let attempt = slow.attempt(&ctx, &session).await;
    println!("结果: {:?}", attempt.result);
    print_report(&attempt.report);

    // 3. 无截止时间，故障策略提前返回，触发固定窗口超时
    println!("\n3. 故障注入策略，无截止时间");
    let session = ResourceHandle::new(Arc::new(SimulatedSession::new("audit-db")));
    let ctx = Context::with_value(&Context::background(), RETURN_KEY, EARLY);
    let attempt = slow.attempt(&ctx, &session).await;
    println!("结果: {:?}", attempt.result);
    print_report(&attempt.report);

    println!("\n等待后台关闭任务结束...");
    attempt.task.join().await;
    println!("会话状态: {:?}", session.state());

    println!("\n=== 示例完成 ===");
}

fn print_report(report: &quiesce_shutdown::CloseReport) {
    match report.to_json() {
        Ok(json) => println!("记录: {}", json),
        Err(e) => println!("记录序列化失败: {}", e),
    }
}
