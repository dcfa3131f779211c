use crate::activity::{Activity, ActivityKind, Registry, Scope};
use crate::error::{Error, NetError};
use crate::net::{CommunicationType, PetriNet};
use crate::parser::{SERVICE_MODEL_NS, TokenStream, qualify};

const DEFAULT_CONTRACT: &str = "C";
const REPLY_PORT: &str = "reply";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagingKind {
    Send,
    Receive,
    SendReply,
    ReceiveReply,
}

impl MessagingKind {
    pub const ALL: [MessagingKind; 4] = [
        MessagingKind::Send,
        MessagingKind::Receive,
        MessagingKind::SendReply,
        MessagingKind::ReceiveReply,
    ];

    fn local_name(self) -> &'static str {
        match self {
            MessagingKind::Send => "Send",
            MessagingKind::Receive => "Receive",
            MessagingKind::SendReply => "SendReply",
            MessagingKind::ReceiveReply => "ReceiveReply",
        }
    }

    fn label(self) -> &'static str {
        match self {
            MessagingKind::Send => "send",
            MessagingKind::Receive => "receive",
            MessagingKind::SendReply => "sendreply",
            MessagingKind::ReceiveReply => "receivereply",
        }
    }

    fn direction(self) -> CommunicationType {
        match self {
            MessagingKind::Send | MessagingKind::SendReply => CommunicationType::Output,
            MessagingKind::Receive | MessagingKind::ReceiveReply => CommunicationType::Input,
        }
    }

    fn is_reply(self) -> bool {
        matches!(self, MessagingKind::SendReply | MessagingKind::ReceiveReply)
    }
}

/// Message exchange with the environment of the net.
///
/// Each activity owns an interface place: `out.{contract}.{operation}` for
/// sends and `in.{contract}.{operation}` for receives. Replies are keyed by
/// scope instead, as `out.{scope}.reply` or `in.{scope}.reply`. A place
/// that already exists under that name is shared.
#[derive(Debug, Clone)]
pub struct Messaging {
    kind: MessagingKind,
    contract: String,
    operation: String,
}

impl Messaging {
    #[must_use]
    pub fn new(kind: MessagingKind) -> Self {
        Self {
            kind,
            contract: DEFAULT_CONTRACT.to_string(),
            operation: String::new(),
        }
    }

    #[must_use]
    pub fn contract(&self) -> &str {
        &self.contract
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    fn message_place(&self, scope: Scope) -> String {
        let direction = match self.kind.direction() {
            CommunicationType::Input => "in",
            _ => "out",
        };
        if self.kind.is_reply() {
            format!("{direction}.{}.reply", scope.id())
        } else {
            format!("{direction}.{}.{}", self.contract, self.operation)
        }
    }
}

impl Activity for Messaging {
    fn qname(&self) -> String {
        qualify(SERVICE_MODEL_NS, self.kind.local_name())
    }

    fn local_name(&self) -> &str {
        self.kind.local_name()
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::Primitive
    }

    fn parse(&mut self, tokens: &mut TokenStream, _registry: &Registry) -> Result<(), Error> {
        let qname = self.qname();
        let name = self.kind.local_name();
        if !tokens.at_start_of(&qname) {
            return Err(tokens.structural(format!("expected '{qname}'"), name));
        }
        let start = tokens.skip_element(name)?;

        if self.kind.is_reply() {
            return Ok(());
        }
        self.operation = start
            .attribute("OperationName")
            .filter(|op| !op.is_empty())
            .ok_or_else(|| tokens.structural("missing attribute 'OperationName'", name))?
            .to_string();
        if let Some(contract) = start.attribute("ServiceContractName") {
            self.contract = contract_name(contract).to_string();
        }
        Ok(())
    }

    fn compile(&self, net: &mut PetriNet) -> Result<(), NetError> {
        let scope = Scope::open(net)?;
        let direction = self.kind.direction();

        let message = self.message_place(scope);
        if net.find(&message).is_none() {
            net.new_place(message.clone(), direction)?;
        }
        let port = if self.kind.is_reply() {
            REPLY_PORT
        } else {
            self.contract.as_str()
        };
        net.add_port(port, message.clone());

        let transition = net.new_transition_of(scope.name(self.kind.label()), direction)?;
        net.new_arc(&scope.initialized(), transition)?;
        net.new_arc(transition, &scope.closed())?;
        match direction {
            CommunicationType::Input => net.new_arc(&message, transition),
            _ => net.new_arc(transition, &message),
        }
    }
}

/// `{http://tempuri.org/}IService` and `p:IService` both name `IService`.
fn contract_name(raw: &str) -> &str {
    raw.rsplit(['}', ':']).next().unwrap_or(raw)
}
