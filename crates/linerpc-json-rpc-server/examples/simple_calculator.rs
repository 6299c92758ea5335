//! Simple Calculator JSON-RPC Example
//!
//! Registers one method of each handler variant on a dispatcher and feeds it
//! a single request, a batch and the built-in `rpc.methodList` call.

use std::time::Duration;

use linerpc_json_rpc_server::{Dispatcher, HandlerError};
use serde_json::{Value, json};

fn number(params: &[Value], index: usize) -> Result<f64, HandlerError> {
    params
        .get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| HandlerError::exception(format!("param {} must be a number", index)))
}

#[tokio::main]
async fn main() {
    let dispatcher = Dispatcher::new();

    dispatcher.register_blocking("add", |params| {
        Ok(json!(number(&params, 0)? + number(&params, 1)?))
    });

    dispatcher.register_callback("divide", 2, |params, done| {
        let result = number(&params, 0).and_then(|a| {
            let b = number(&params, 1)?;
            if b == 0.0 {
                Err(HandlerError::payload(json!({"reason": "division by zero"})))
            } else {
                Ok(json!(a / b))
            }
        });
        done.complete(result);
    });

    dispatcher.register_promise("delayed_subtract", |params| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(json!(number(&params, 0)? - number(&params, 1)?))
    });

    let single = dispatcher
        .handle(json!({"jsonrpc": "2.0", "method": "add", "params": [2, 3], "id": 1}))
        .await;
    println!("add: {}", single);

    let batch = dispatcher
        .handle(json!([
            {"jsonrpc": "2.0", "method": "delayed_subtract", "params": [10, 4], "id": 2},
            {"jsonrpc": "2.0", "method": "divide", "params": [1, 0], "id": 3},
            {"jsonrpc": "2.0", "method": "sqrt", "params": [9], "id": 4}
        ]))
        .await;
    println!("batch: {}", batch);

    let methods = dispatcher
        .handle(json!({"jsonrpc": "2.0", "method": "rpc.methodList", "id": 5}))
        .await;
    println!("methods: {}", methods);
}
