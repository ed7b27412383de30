use telecare_core::ParticipantId;

/// One connected client inside a session. `user_id` is whatever identity the
/// authentication layer put on the socket path; the relay treats it as opaque.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub user_id: Option<String>,
}

impl Participant {
    pub fn new(id: ParticipantId, user_id: Option<String>) -> Self {
        Self { id, user_id }
    }
}

/// One consultation's live call context. Holds at most two participants, in
/// join order: the earlier participant is the designated call initiator.
#[derive(Debug, Default)]
pub struct Session {
    participants: Vec<Participant>,
}

pub const SESSION_CAPACITY: usize = 2;

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.iter().any(|p| &p.id == id)
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= SESSION_CAPACITY
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// The participant that was present before `joiner`, if any.
    pub fn earlier_than(&self, joiner: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id != joiner)
    }

    pub fn push(&mut self, participant: Participant) {
        debug_assert!(!self.is_full());
        self.participants.push(participant);
    }

    /// Removes `id`, returning true if it was a member.
    pub fn remove(&mut self, id: &ParticipantId) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| &p.id != id);
        self.participants.len() != before
    }

    /// Whoever is left after a removal.
    pub fn remaining(&self) -> Option<&Participant> {
        self.participants.first()
    }
}
