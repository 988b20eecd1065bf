use crate::capture::domain::captured_image::CapturedImage;
use crate::gateway::domain::service_response::ServiceResponse;
use crate::workflow::domain::operation_kind::OperationKind;
use crate::workflow::domain::outcome::{AnalyzeOutcome, Outcome, RegisterOutcome, VerifyOutcome};

/// Port to the remote recognition service.
///
/// Each call consumes the payload it submits and blocks until the service
/// answers or the transport gives up. Implementations never panic on bad
/// responses: every problem is folded into a `FailureReason`.
pub trait RecognitionGateway: Send + Sync {
    fn register(&self, image: CapturedImage) -> ServiceResponse<RegisterOutcome>;

    fn verify(&self, image: CapturedImage) -> ServiceResponse<VerifyOutcome>;

    fn analyze(&self, image: CapturedImage) -> ServiceResponse<AnalyzeOutcome>;

    /// Routes `image` to the call matching `kind`.
    fn dispatch(&self, kind: OperationKind, image: CapturedImage) -> ServiceResponse<Outcome> {
        match kind {
            OperationKind::Register => self.register(image).map(Outcome::from),
            OperationKind::Verify => self.verify(image).map(Outcome::from),
            OperationKind::Analyze => self.analyze(image).map(Outcome::from),
        }
    }
}
