use conveyor_derive::conveyor_error;

#[conveyor_error]
pub enum QueueError {
    #[error("Queue I/O failed: {0}")]
    Io(std::io::Error),
}

fn main() {}
