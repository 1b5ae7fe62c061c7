use super::*;

#[derive(Debug, Clone)]
enum Reply {
    Xml(String),
    Failure(String),
}

/// Offline session answering each RPC name with a fixed XML reply.
///
/// Every request is kept so tests can assert on the arguments a table sent.
/// Replies can be swapped between calls to simulate a device changing state.
#[derive(Debug)]
pub struct StaticSession {
    hostname: String,
    replies: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<RpcRequest>>,
}

impl StaticSession {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            replies: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Builder-style [`StaticSession::set_reply`].
    ///
    /// Owning the session means no other thread holds the lock, so a
    /// poisoned map is taken over as is.
    pub fn with_reply(mut self, rpc: &str, xml: impl Into<String>) -> Self {
        self.replies
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(normalize_rpc(rpc), Reply::Xml(xml.into()));
        self
    }

    /// Serves `xml` for every later call of `rpc`.
    pub fn set_reply(&self, rpc: &str, xml: impl Into<String>) -> Result<(), RpcError> {
        self.replies
            .lock()
            .map_err(|e| RpcError::Internal(format!("reply lock error: {e}")))?
            .insert(normalize_rpc(rpc), Reply::Xml(xml.into()));
        Ok(())
    }

    /// Makes every later call of `rpc` fail with a transport error.
    pub fn fail_with(&self, rpc: &str, message: impl Into<String>) -> Result<(), RpcError> {
        self.replies
            .lock()
            .map_err(|e| RpcError::Internal(format!("reply lock error: {e}")))?
            .insert(normalize_rpc(rpc), Reply::Failure(message.into()));
        Ok(())
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Result<Vec<RpcRequest>, RpcError> {
        let guard = self
            .requests
            .lock()
            .map_err(|e| RpcError::Internal(format!("request lock error: {e}")))?;
        Ok(guard.clone())
    }
}

impl Session for StaticSession {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn execute(&self, request: &RpcRequest) -> Result<Document, RpcError> {
        self.requests
            .lock()
            .map_err(|e| RpcError::Internal(format!("request lock error: {e}")))?
            .push(request.clone());

        let reply = self
            .replies
            .lock()
            .map_err(|e| RpcError::Internal(format!("reply lock error: {e}")))?
            .get(&normalize_rpc(&request.rpc))
            .cloned();
        match reply {
            Some(Reply::Xml(xml)) => Ok(Document::parse(&xml)?),
            Some(Reply::Failure(message)) => Err(RpcError::Transport(message)),
            None => Err(RpcError::Rpc {
                rpc: request.tag(),
                message: "syntax error, expecting <rpc> command".to_string(),
            }),
        }
    }
}

// `get_x` and `get-x` name the same operation
fn normalize_rpc(rpc: &str) -> String {
    rpc.replace('_', "-")
}
