use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use kafka_courier::{Config, Kafka};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "kafka-courier")]
#[command(about = "Publish to and consume from Kafka topics", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish a single message
    Publish {
        #[arg(short, long)]
        topic: String,

        #[arg(short, long, help = "Broker list, defaults to the configured brokers")]
        broker: Option<String>,

        #[arg(short, long)]
        key: Option<String>,

        #[arg(long = "header", value_name = "NAME=VALUE", value_parser = parse_pair)]
        headers: Vec<(String, String)>,

        #[arg(long = "option", value_name = "NAME=VALUE", value_parser = parse_pair)]
        options: Vec<(String, String)>,

        #[arg(short, long)]
        partition: Option<i32>,

        #[arg(long, help = "Message body as JSON", default_value = "null")]
        body: String,

        #[arg(long, help = "Enable librdkafka debug logging")]
        debug: bool,

        #[arg(long, help = "Record the message instead of sending it and print it")]
        fake: bool,
    },
    /// Consume messages and print them
    Consume {
        #[arg(short, long, required = true)]
        topic: Vec<String>,

        #[arg(short, long, help = "Broker list, defaults to the configured brokers")]
        broker: Option<String>,

        #[arg(short, long, default_value = "group")]
        group: String,

        #[arg(short, long)]
        max_messages: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Config::from_file(path)
        }
        None => Config::from_env(),
    };
    let config = match config {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!(
        kafka_brokers = ?config.kafka.brokers,
        flush_timeout_ms = config.kafka.flush_timeout_ms,
        fake = config.kafka.fake,
        "Configuration summary"
    );

    let default_broker = config.kafka.brokers_string();
    let kafka = Kafka::new(config.kafka);

    match args.command {
        Command::Publish {
            topic,
            broker,
            key,
            headers,
            options,
            partition,
            body,
            debug,
            fake,
        } => {
            let recorder = fake.then(|| kafka.fake());
            let body: serde_json::Value =
                serde_json::from_str(&body).context("--body must be valid JSON")?;

            let mut builder = kafka
                .publish_on(broker.unwrap_or(default_broker), topic)?
                .with_config_options(options)
                .with_headers(headers)
                .with_body(body)
                .with_debug_enabled(debug);
            if let Some(key) = key {
                builder = builder.with_message_key(key);
            }
            if let Some(partition) = partition {
                builder = builder.with_partition(partition);
            }

            builder.send()?;

            if let Some(recorder) = recorder {
                for snapshot in recorder.all() {
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                }
            }
        }
        Command::Consume {
            topic,
            broker,
            group,
            max_messages,
        } => {
            let mut builder = kafka
                .create_consumer(broker.unwrap_or(default_broker), topic)?
                .with_consumer_group_id(group);
            if let Some(max) = max_messages {
                builder = builder.with_max_messages(max);
            }

            let consumer = builder.build()?;
            consumer.consume(|message| {
                println!(
                    "{}[{}]@{} key={} {}",
                    message.topic,
                    message.partition,
                    message.offset,
                    message.key_str().unwrap_or("-"),
                    String::from_utf8_lossy(&message.payload)
                );
                Ok(())
            })?;
        }
    }

    Ok(())
}

fn parse_pair(raw: &str) -> anyhow::Result<(String, String)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => bail!("expected NAME=VALUE, got '{}'", raw),
    }
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("kafka_courier=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("kafka_courier=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
