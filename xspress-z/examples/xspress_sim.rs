//! Minimal detector control server.
//!
//! Listens on the control endpoint, keeps a detector state of its own,
//! applies configure messages to it, answers configuration requests with
//! the whole state and acknowledges every command.

use clap::Parser;
use serde_json::Value;
use zenoh::{Result, Wait};

use xspress_z::{
    attachment::Attachment,
    endpoint::Endpoint,
    message::{self, Message, MsgType, Params, Verb},
    param::{ParameterTree, detector_tree},
    state::DetectorState,
    transport::zlink::DEFAULT_KEY_PREFIX,
};

#[derive(Debug, Parser)]
struct Args {
    /// Address:port to listen on
    #[arg(short, long, default_value = "127.0.0.1:12000")]
    listen: String,

    #[arg(short, long, default_value = DEFAULT_KEY_PREFIX)]
    key_prefix: String,

    /// Answer this verb with a nack, e.g. start
    #[arg(long)]
    nack: Option<Verb>,
}

struct Device {
    tree: ParameterTree<DetectorState>,
    state: DetectorState,
    nack: Option<Verb>,
}

impl Device {
    fn answer(&mut self, msg: Message) -> Message {
        if Some(msg.verb) == self.nack {
            return Message::nack(msg.verb, msg.id, "rejected by simulator");
        }
        match msg.verb {
            Verb::Configure => {
                self.tree
                    .merge_recursive(&mut self.state, "", &Value::Object(msg.params));
                Message::ack(msg.verb, msg.id, Params::new())
            }
            Verb::RequestConfiguration => {
                let mut params = match self.tree.get(&self.state, "") {
                    Ok(Value::Object(map)) => map,
                    _ => Params::new(),
                };
                params.remove("cmd");
                Message::ack(msg.verb, msg.id, params)
            }
            verb => {
                println!("command: {verb}");
                Message::ack(verb, msg.id, Params::new())
            }
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let endpoint: Endpoint = args.listen.parse()?;
    let prefix = args.key_prefix.trim_end_matches('/').to_string();

    let mut config = zenoh::Config::default();
    config.insert_json5("mode", r#""router""#)?;
    config.insert_json5("listen/endpoints", &format!(r#"["{}"]"#, endpoint.locator()))?;
    config.insert_json5("scouting/multicast/enabled", "false")?;
    let session = zenoh::open(config).wait()?;

    let zsub = session
        .declare_subscriber(format!("{prefix}/request"))
        .wait()?;
    println!("simulator listening on {endpoint}, prefix {prefix}");

    let mut device = Device {
        tree: detector_tree()?,
        state: DetectorState::default(),
        nack: args.nack,
    };

    loop {
        let sample = zsub.recv()?;
        let Some(attachment) = sample.attachment() else {
            eprintln!("request without attachment, ignored");
            continue;
        };
        let attachment = Attachment::try_from(attachment)?;
        let msg = match message::decode(&sample.payload().to_bytes()) {
            Ok(msg) if msg.msg_type == MsgType::Cmd => msg,
            Ok(msg) => {
                eprintln!("ignoring '{}' from {}", msg.msg_type, attachment.identity);
                continue;
            }
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        let reply = device.answer(msg);
        session
            .put(
                format!("{prefix}/reply/{}", attachment.identity),
                message::encode(&reply)?,
            )
            .wait()?;
    }
}
