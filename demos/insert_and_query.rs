use chrono::FixedOffset;
use influx_access::{ConnectionConfig, Fields, InfluxClient, InfluxProperties, Tags};
use serde::Deserialize;
use std::error::Error;

#[derive(Debug, Deserialize)]
struct CpuRow {
    time: String,
    host: String,
    usage: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    influx_access::init_tracing();

    println!("=== Insert and Query Example ===\n");

    // Defaults, overridden by INFLUX_* environment variables
    let mut properties = InfluxProperties::new("demo");
    properties.retention_policy = Some("hourly".to_string());
    properties.retention_policy_time = Some("2h".to_string());
    properties.skip_error = true;
    properties.apply_env_overrides()?;

    let config = ConnectionConfig::try_from(properties)?;
    println!("Config: {}", config);

    let client = InfluxClient::new(config);
    if !client.ping().await {
        println!("InfluxDB unreachable, client is running in no-op mode");
    }

    // 1. Single point
    println!("1. Inserting single point...");
    let tags = Tags::from([("host".to_string(), "a".to_string())]);
    let fields = Fields::from([("usage".to_string(), 42.5.into())]);
    client.insert("cpu", &tags, &fields).await?;
    println!("   ✓ cpu,host=a usage=42.5\n");

    // 2. Batch sharing one instant
    println!("2. Batch inserting 10 points...");
    let field_sets: Vec<Fields> = (0..10)
        .map(|i| Fields::from([("usage".to_string(), (i as f64 * 10.0).into())]))
        .collect();
    let east8 = FixedOffset::east_opt(8 * 3600).ok_or("invalid offset")?;
    client
        .batch_insert_with_offset("cpu", &tags, &field_sets, east8)
        .await?;
    println!("   ✓ Inserted 10 points with distinct timestamps\n");

    // 3. Records
    println!("3. Querying records...");
    for record in client.query_records("SELECT * FROM cpu LIMIT 5").await? {
        println!("   {:?}", record);
    }

    // 4. Typed rows
    println!("\n4. Querying typed rows...");
    let rows: Vec<CpuRow> = client.query_as("SELECT * FROM cpu LIMIT 5").await?;
    for row in rows {
        println!("   {} {} {:.1}", row.time, row.host, row.usage);
    }

    println!("\n=== Done ===");
    Ok(())
}
