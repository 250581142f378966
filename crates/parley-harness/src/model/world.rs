//! Model world: clients and relay together.
//!
//! The world applies operations to the model and exposes the observable
//! state the simulated system must agree with.

use super::{
    client::ModelClient,
    operation::{ClientId, ModelRoomId, Operation, OperationError, OperationResult, PasswordId},
    relay::ModelRelay,
};

/// What a user of one client can observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientView {
    /// Transport is up.
    pub connected: bool,
    /// Room the client is joined to.
    pub joined: Option<ModelRoomId>,
    /// Rooms that refused the client's password, ascending.
    pub rejected: Vec<ModelRoomId>,
    /// Chat messages received from others.
    pub received: usize,
}

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Existing rooms in id order, each with its members in join order.
    pub rooms: Vec<(ModelRoomId, Vec<ClientId>)>,
    /// Per-client view, indexed by `ClientId`.
    pub clients: Vec<ClientView>,
}

/// Model world - the reference implementation.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    clients: Vec<ModelClient>,
    relay: ModelRelay,
}

impl ModelWorld {
    /// Create a new model world with the given number of clients.
    pub fn new(num_clients: usize) -> Self {
        let clients = (0..num_clients)
            .map(|i| ModelClient::new(ClientId::try_from(i).unwrap_or(ClientId::MAX)))
            .collect();

        Self { clients, relay: ModelRelay::new() }
    }

    /// Number of clients in the world.
    pub fn num_clients(&self) -> usize {
        self.clients.len()
    }

    /// Get a client by ID.
    pub fn client(&self, id: ClientId) -> Option<&ModelClient> {
        self.clients.get(usize::from(id))
    }

    /// Get the relay.
    pub fn relay(&self) -> &ModelRelay {
        &self.relay
    }

    /// Apply an operation and return the result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match op {
            Operation::Join { client_id, room_id, password } => {
                self.apply_join(*client_id, *room_id, *password)
            },
            Operation::SendMessage { client_id, content } => {
                self.apply_send(*client_id, content.to_text().is_empty())
            },
            Operation::LeaveRoom { client_id } => self.apply_leave(*client_id),
            Operation::Disconnect { client_id } | Operation::DropConnection { client_id } => {
                self.apply_disconnect(*client_id)
            },
            // Every client answers pings: time alone changes nothing.
            Operation::AdvanceTime { .. } => OperationResult::Ok,
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        let rooms = self.relay.rooms().map(|(id, members)| (id, members.to_vec())).collect();

        let clients = self
            .clients
            .iter()
            .map(|c| ClientView {
                connected: c.is_connected(),
                joined: c.joined(),
                rejected: c.rejected().collect(),
                received: c.received(),
            })
            .collect();

        ObservableState { rooms, clients }
    }

    fn apply_join(
        &mut self,
        client_id: ClientId,
        room_id: ModelRoomId,
        password: PasswordId,
    ) -> OperationResult {
        let Some(client) = self.clients.get_mut(usize::from(client_id)) else {
            return OperationResult::Error(OperationError::InvalidClient);
        };

        client.connected = true;
        client.active = Some(room_id);
        client.rejected.remove(&room_id);

        if self.relay.join(client_id, room_id, password, client.relay_room) {
            client.relay_room = Some(room_id);
            client.joined = Some(room_id);
        } else {
            client.rejected.insert(room_id);
            client.joined = None;
        }

        OperationResult::Ok
    }

    fn apply_send(&mut self, client_id: ClientId, empty: bool) -> OperationResult {
        let Some(client) = self.clients.get(usize::from(client_id)) else {
            return OperationResult::Error(OperationError::InvalidClient);
        };

        let Some(room) = client.joined.filter(|_| client.connected) else {
            return OperationResult::Error(OperationError::NotJoined);
        };

        if empty {
            return OperationResult::Ok;
        }

        // Everyone else the relay counts in the room and who is looking at it.
        let recipients: Vec<ClientId> = self
            .relay
            .members(room)
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(|m| *m != client_id)
            .collect();

        for member in recipients {
            if let Some(other) = self.clients.get_mut(usize::from(member)) {
                if other.joined == Some(room) {
                    other.received += 1;
                }
            }
        }

        OperationResult::Ok
    }

    fn apply_leave(&mut self, client_id: ClientId) -> OperationResult {
        let Some(client) = self.clients.get_mut(usize::from(client_id)) else {
            return OperationResult::Error(OperationError::InvalidClient);
        };

        if client.connected && client.active.is_some() {
            if let Some(room) = client.relay_room.take() {
                self.relay.remove(room, client_id);
            }
        }
        client.active = None;
        client.joined = None;

        OperationResult::Ok
    }

    fn apply_disconnect(&mut self, client_id: ClientId) -> OperationResult {
        let Some(client) = self.clients.get_mut(usize::from(client_id)) else {
            return OperationResult::Error(OperationError::InvalidClient);
        };

        if let Some(room) = client.relay_room {
            self.relay.remove(room, client_id);
        }
        client.disconnect();

        OperationResult::Ok
    }
}
