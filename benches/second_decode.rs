use brrtbind::{Api, BindConfig, Describe, Input, Operation, Reply, RequestParts};
use criterion::{criterion_group, criterion_main, Criterion};
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::hint::black_box;

#[derive(Debug, Serialize, Deserialize, Describe)]
struct LineItem {
    #[bind(min_length = 1, max_length = 64)]
    sku: String,
    #[bind(minimum = 1, maximum = 1000)]
    quantity: u32,
    #[bind(minimum = 0)]
    unit_price: f64,
}

#[derive(Debug, Serialize, Deserialize, Describe)]
struct Address {
    street: String,
    city: String,
    #[bind(pattern = "^[A-Z]{2}$")]
    country: String,
}

#[derive(Debug, Serialize, Deserialize, Describe)]
struct Order {
    #[bind(max_length = 128)]
    customer: String,
    shipping: Address,
    #[bind(min_items = 1, max_items = 100)]
    items: Vec<LineItem>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Input)]
struct PlaceOrder {
    #[bind(path = "store")]
    store: u32,
    #[bind(header = "Idempotency-Key")]
    idempotency_key: Option<String>,
    body: Order,
}

fn order_document(items: usize) -> Value {
    json!({
        "customer": "Ada Lovelace",
        "shipping": {"street": "12 Analytical Way", "city": "London", "country": "GB"},
        "items": (0..items)
            .map(|i| json!({"sku": format!("SKU-{i:04}"), "quantity": i % 9 + 1, "unit_price": 4.5}))
            .collect::<Vec<_>>(),
        "notes": "leave at the door",
    })
}

fn order_api() -> Api {
    let mut api = Api::new(BindConfig::default());
    api.register(
        Operation::post("/stores/{store}/orders"),
        |_ctx, input: PlaceOrder| {
            Ok(Reply(json!({
                "store": input.store,
                "idempotency_key": input.idempotency_key,
                "customer": input.body.customer,
                "lines": input.body.items.len(),
            })))
        },
    )
    .expect("operation registers");
    api
}

fn bench_bind_and_decode(c: &mut Criterion) {
    let api = order_api();
    for items in [1usize, 20, 100] {
        let payload = serde_json::to_vec(&order_document(items)).expect("document encodes");
        c.bench_function(&format!("bind_order_{items}_items"), |b| {
            b.iter(|| {
                let request = RequestParts::new(Method::POST, "/stores/7/orders")
                    .header("content-type", "application/json")
                    .header("idempotency-key", "01HZX")
                    .body(payload.clone());
                black_box(api.handle(request))
            })
        });
    }
}

fn bench_invalid_order(c: &mut Criterion) {
    let api = order_api();
    let mut document = order_document(20);
    document["shipping"]["country"] = json!("Britain");
    document["items"][3]["quantity"] = json!(0);
    let payload = serde_json::to_vec(&document).expect("document encodes");
    c.bench_function("bind_order_with_errors", |b| {
        b.iter(|| {
            let request = RequestParts::new(Method::POST, "/stores/7/orders")
                .header("content-type", "application/json")
                .body(payload.clone());
            black_box(api.handle(request))
        })
    });
}

criterion_group!(benches, bench_bind_and_decode, bench_invalid_order);
criterion_main!(benches);
