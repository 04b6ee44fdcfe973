use f5_route_controller::crd::Route;
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&Route::crd())?);
    Ok(())
}
